//! Session ids.
//!
//! A session id is a pet name like `brave-otter`. It names the compose
//! project, so it only uses lowercase letters and dashes.

use rand::Rng;
use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "able", "bold", "brave", "calm", "clever", "cosmic", "crisp", "daring", "eager", "fancy",
    "fluent", "frank", "gentle", "glad", "golden", "grand", "happy", "hardy", "humble", "jolly",
    "keen", "kind", "lively", "lucky", "merry", "mighty", "modest", "nimble", "noble", "polite",
    "proud", "quick", "quiet", "rapid", "regal", "sharp", "shiny", "silent", "smart", "solid",
    "steady", "sunny", "swift", "tidy", "vivid", "warm", "wise", "witty", "young", "zesty",
];

const ANIMALS: &[&str] = &[
    "badger", "beaver", "bison", "camel", "cobra", "condor", "coyote", "crane", "dingo", "dolphin",
    "eagle", "falcon", "ferret", "finch", "gecko", "gibbon", "heron", "hyena", "ibis", "impala",
    "jackal", "koala", "lemur", "lynx", "magpie", "marmot", "moose", "narwhal", "ocelot", "otter",
    "panda", "pelican", "puffin", "quail", "raven", "salmon", "seal", "sparrow", "tapir", "tiger",
    "toucan", "turtle", "urchin", "viper", "walrus", "weasel", "wombat", "yak", "zebra", "zorilla",
];

/// Generate a new session id
pub fn new_id() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("brave");
    let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("otter");
    if rng.gen_bool(0.5) {
        format!("{}-{}", adjective, animal)
    } else {
        format!("{}-{}-{}", adjective, animal, rng.gen_range(1..100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_session_ids_are_project_safe() {
        let re = Regex::new(r"^[a-z]+-[a-z]+(-[0-9]+)?$").unwrap();
        for _ in 0..100 {
            let id = new_id();
            assert!(re.is_match(&id), "unexpected id {}", id);
        }
    }
}
