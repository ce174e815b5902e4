use rand::seq::SliceRandom;

/// Source of display names for people who post without one.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "Cheerful", "Gentle", "Brave", "Sleepy", "Curious", "Sunny", "Quiet", "Lucky", "Clever",
    "Warm", "Bouncy", "Kind",
];

const ANIMALS: &[&str] = &[
    "Otter", "Panda", "Fox", "Penguin", "Koala", "Hedgehog", "Rabbit", "Owl", "Dolphin",
    "Squirrel", "Turtle", "Whale",
];

#[derive(Debug, Default, Clone)]
pub struct RandomNames;

impl NameGenerator for RandomNames {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Anonymous");
        let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("Friend");
        format!("{adjective} {animal}")
    }
}

/// Always hands out the same name. Useful where output must be reproducible.
#[derive(Debug, Clone)]
pub struct FixedName(pub String);

impl NameGenerator for FixedName {
    fn generate(&self) -> String {
        self.0.clone()
    }
}

/// Trimmed `name`, or a generated one when it is missing or blank.
pub fn or_generated(name: Option<&str>, names: &dyn NameGenerator) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => names.generate(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_names_use_both_lists() {
        let name = RandomNames.generate();
        let (adjective, animal) = name.split_once(' ').unwrap();
        assert!(ADJECTIVES.contains(&adjective));
        assert!(ANIMALS.contains(&animal));
    }

    #[test]
    fn blank_names_fall_back() {
        let names = FixedName("Quiet Owl".into());
        assert_eq!(or_generated(Some("  "), &names), "Quiet Owl");
        assert_eq!(or_generated(None, &names), "Quiet Owl");
        assert_eq!(or_generated(Some(" Mina "), &names), "Mina");
    }
}
