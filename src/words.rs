// ====================================================================================
// src/words.rs - 词库与句子拼装
// ====================================================================================
use rand::seq::SliceRandom;
use rand::Rng;

// 词缀标记：后缀以它开头，前缀以它结尾
const AFFIX_MARKER: char = '-';

const WORD_POOL: &[&str] = &[
    "The", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "in", "the", "park", "today",
    "happy", "sunny", "day", "play", "red", "blue", "green", "cat", "runs", "fast", "slow", "big",
    "small", "-ly", "-ing", "-s", "-ed", "un-", "re-", "pre-",
];

/// Draws the vocabulary offered to players at the start of a round.
#[derive(Debug, Clone)]
pub struct WordBank {
    pool: Vec<String>,
    sample_size: usize,
}

impl WordBank {
    pub fn new(sample_size: usize) -> Self {
        Self::with_pool(WORD_POOL.iter().map(|w| w.to_string()).collect(), sample_size)
    }

    pub fn with_pool(pool: Vec<String>, sample_size: usize) -> Self {
        Self { pool, sample_size }
    }

    pub fn draw(&self) -> Vec<String> {
        self.draw_with(&mut rand::thread_rng())
    }

    // 无放回抽样，顺序即展示顺序
    pub fn draw_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        self.pool
            .choose_multiple(rng, self.sample_size)
            .cloned()
            .collect()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Chip<'a> {
    Suffix(&'a str),
    Prefix(&'a str),
    Word(&'a str),
}

fn classify(chip: &str) -> Chip<'_> {
    if let Some(text) = chip.strip_prefix(AFFIX_MARKER) {
        Chip::Suffix(text)
    } else if let Some(text) = chip.strip_suffix(AFFIX_MARKER) {
        Chip::Prefix(text)
    } else {
        Chip::Word(chip)
    }
}

// 仍带连字符的条目是未合并的词缀
fn is_fragment(text: &str) -> bool {
    text.starts_with(AFFIX_MARKER) || text.ends_with(AFFIX_MARKER)
}

/// Merges an ordered list of word and affix chips into one sentence.
///
/// A suffix (`-ly`) attaches to the entry before it unless that entry still
/// carries a hyphen. A prefix (`un-`) swallows the next chip as-is unless
/// that chip is a suffix. Affixes with nothing to attach to lose their hyphen.
pub fn assemble<S: AsRef<str>>(chips: &[S]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(chips.len());
    let mut i = 0;

    while i < chips.len() {
        match classify(chips[i].as_ref()) {
            Chip::Suffix(suffix) => match parts.last_mut() {
                Some(last) if !is_fragment(last.as_str()) => last.push_str(suffix),
                _ => parts.push(suffix.to_string()),
            },
            Chip::Prefix(prefix) => {
                let next = chips.get(i + 1).map(|c| c.as_ref());
                match next {
                    Some(next) if !matches!(classify(next), Chip::Suffix(_)) => {
                        parts.push(format!("{prefix}{next}"));
                        i += 1;
                    }
                    _ => parts.push(prefix.to_string()),
                }
            }
            Chip::Word(word) => parts.push(word.to_string()),
        }
        i += 1;
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn draw_takes_distinct_entries_from_the_pool() {
        let bank = WordBank::new(15);
        let words = bank.draw_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(words.len(), 15);

        // 池中 "The" 与 "the" 大小写不同，不算重复
        let unique: HashSet<_> = words.iter().collect();
        assert_eq!(unique.len(), 15);
        assert!(words.iter().all(|w| WORD_POOL.contains(&w.as_str())));
    }

    #[test]
    fn draw_is_capped_by_pool_size() {
        let bank = WordBank::with_pool(vec!["a".into(), "b".into()], 15);
        let mut words = bank.draw();
        words.sort();
        assert_eq!(words, vec!["a", "b"]);
    }

    #[test]
    fn prefix_then_suffix_build_one_word() {
        assert_eq!(assemble(&["un-", "happy", "-ly"]), "unhappyly");
    }

    #[test]
    fn assemble_is_deterministic() {
        let chips = ["The", "fox", "jump", "-ed", "re-", "play", "-ing"];
        assert_eq!(assemble(&chips), assemble(&chips));
        assert_eq!(assemble(&chips), "The fox jumped replaying");
    }

    #[test]
    fn plain_words_are_joined_with_spaces() {
        assert_eq!(assemble(&["the", "quick", "fox"]), "the quick fox");
        assert_eq!(assemble::<&str>(&[]), "");
    }

    #[test]
    fn leading_suffix_stays_bare() {
        assert_eq!(assemble(&["-ing", "dog"]), "ing dog");
    }

    #[test]
    fn suffix_merges_into_a_dehyphenated_fragment() {
        assert_eq!(assemble(&["-ing", "-ly"]), "ingly");
        assert_eq!(assemble(&["un-", "-ed"]), "uned");
        assert_eq!(assemble(&["cat", "pre-", "-s"]), "cat pres");
    }

    #[test]
    fn suffix_stays_apart_from_an_entry_ending_in_a_hyphen() {
        assert_eq!(assemble(&["un-", "re-", "-ed"]), "unre- ed");
    }

    #[test]
    fn trailing_prefix_stays_bare() {
        assert_eq!(assemble(&["cat", "pre-"]), "cat pre");
    }

    #[test]
    fn prefix_swallows_the_next_chip_verbatim() {
        assert_eq!(assemble(&["un-", "re-", "do"]), "unre- do");
    }
}
