use rand::seq::SliceRandom;
use std::collections::HashSet;
use uuid::Uuid;

const PHONETIC_WORDS: [&str; 26] = [
    "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India", "Juliet",
    "Kilo", "Lima", "Mike", "November", "Oscar", "Papa", "Quebec", "Romeo", "Sierra", "Tango",
    "Uniform", "Victor", "Whiskey", "Xray", "Yankee", "Zulu",
];

fn suffix() -> String {
    Uuid::new_v4().simple().to_string()[..4].to_string()
}

/// A memorable node id such as `Delta-3f9c`. Ids are opaque to the
/// simulator; only uniqueness matters.
pub fn generate_node_id() -> String {
    let word = PHONETIC_WORDS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Node");
    format!("{word}-{}", suffix())
}

/// `count` distinct ids. Phonetic words are not reused until all of them
/// have been taken.
pub fn generate_unique(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut words: Vec<&str> = Vec::new();
    let mut ids = Vec::with_capacity(count);
    let mut seen = HashSet::with_capacity(count);

    while ids.len() < count {
        if words.is_empty() {
            words = PHONETIC_WORDS.to_vec();
            words.shuffle(&mut rng);
        }
        let Some(word) = words.pop() else { break };
        let id = format!("{word}-{}", suffix());
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    ids
}
