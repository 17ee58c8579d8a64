//! Contains utilities and helper functions shared by the extraction stages.
use lazy_static::lazy_static;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{HashMap, HashSet};

lazy_static! {
    /// Spellings accepted as `true` in boolean-like label table cells.
    static ref TRUTHY: HashSet<&'static str> = ["yes", "true", "t", "1"].into_iter().collect();
}

/// Interprets a boolean-like cell. Anything outside the truthy set is `false`.
pub fn is_truthy(value: &str) -> bool {
    TRUTHY.contains(value.trim().to_lowercase().as_str())
}

/// String-keyed map that remembers the position a key was first inserted at.
///
/// Re-inserting an existing key replaces its value but keeps its position, which
/// is what the column order of the output tables relies on.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Inserts or overwrites. Returns the previous value, if any.
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        match self.index.get(&key) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Inserts only when the key is new. Returns whether the value was stored.
    pub fn insert_first(&mut self, key: String, value: V) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.insert(key, value);
        true
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merges `other` into `self`, later values winning.
    pub fn extend(&mut self, other: OrderedMap<V>) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// English cardinal words, e.g. `121` -> "one hundred and twenty-one".
pub fn cardinal_words(n: u64) -> String {
    match n {
        0..=19 => ONES[n as usize].to_string(),
        20..=99 => {
            let tens = TENS[(n / 10) as usize];
            match n % 10 {
                0 => tens.to_string(),
                ones => format!("{tens}-{}", ONES[ones as usize]),
            }
        }
        100..=999 => join_scale(n / 100, "hundred", n % 100),
        1_000..=999_999 => join_scale(n / 1_000, "thousand", n % 1_000),
        1_000_000..=999_999_999 => join_scale(n / 1_000_000, "million", n % 1_000_000),
        _ => join_scale(n / 1_000_000_000, "billion", n % 1_000_000_000),
    }
}

fn join_scale(count: u64, scale: &str, rest: u64) -> String {
    let head = format!("{} {scale}", cardinal_words(count));
    match rest {
        0 => head,
        1..=99 => format!("{head} and {}", cardinal_words(rest)),
        _ => format!("{head}, {}", cardinal_words(rest)),
    }
}

/// English ordinal words, e.g. `1` -> "first", `22` -> "twenty-second".
pub fn ordinal_words(n: u64) -> String {
    let cardinal = cardinal_words(n);
    // Only the last word changes: "twenty-one" -> "twenty-first".
    let split = cardinal
        .rfind(|c: char| c == ' ' || c == '-')
        .map(|i| i + 1)
        .unwrap_or(0);
    let (head, last) = cardinal.split_at(split);
    let last = match last {
        "one" => "first".to_string(),
        "two" => "second".to_string(),
        "three" => "third".to_string(),
        "five" => "fifth".to_string(),
        "eight" => "eighth".to_string(),
        "nine" => "ninth".to_string(),
        "twelve" => "twelfth".to_string(),
        word if word.ends_with('y') => format!("{}ieth", &word[..word.len() - 1]),
        word => format!("{word}th"),
    };
    format!("{head}{last}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_cells() {
        for cell in ["yes", "True", "t", "1", " TRUE "] {
            assert!(is_truthy(cell), "{cell} should be truthy");
        }
        for cell in ["no", "False", "0", "", "y"] {
            assert!(!is_truthy(cell), "{cell} should be falsy");
        }
    }

    #[test]
    fn ordinals() {
        assert_eq!(ordinal_words(1), "first");
        assert_eq!(ordinal_words(2), "second");
        assert_eq!(ordinal_words(3), "third");
        assert_eq!(ordinal_words(4), "fourth");
        assert_eq!(ordinal_words(12), "twelfth");
        assert_eq!(ordinal_words(20), "twentieth");
        assert_eq!(ordinal_words(21), "twenty-first");
        assert_eq!(ordinal_words(100), "one hundredth");
        assert_eq!(ordinal_words(103), "one hundred and third");
        assert_eq!(ordinal_words(1200), "one thousand, two hundredth");
    }

    #[test]
    fn ordered_map_keeps_first_position() {
        let mut map = OrderedMap::new();
        map.insert("b".to_string(), 1);
        map.insert("a".to_string(), 2);
        assert_eq!(map.insert("b".to_string(), 3), Some(1));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(map.get("b"), Some(&3));

        assert!(!map.insert_first("a".to_string(), 9));
        assert_eq!(map.get("a"), Some(&2));
    }

    #[test]
    fn ordered_map_serializes_in_order() {
        let mut map = OrderedMap::new();
        map.insert("z".to_string(), 1);
        map.insert("a".to_string(), 2);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"z":1,"a":2}"#);
    }
}
