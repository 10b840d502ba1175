//! Module unlock gate: a static star-level table, evaluated fresh on every
//! access request since the learner's level can change between requests.

use super::types::{ModuleType, StarLevel};

/// The lowest star level at which a module type becomes accessible.
pub fn minimum_star(module_type: ModuleType) -> StarLevel {
    match module_type {
        ModuleType::Assessment => StarLevel::None,
        ModuleType::Course => StarLevel::One,
        ModuleType::ExpertSession => StarLevel::Two,
        ModuleType::Project => StarLevel::Three,
        ModuleType::Interview => StarLevel::Four,
    }
}

pub fn is_unlocked(module_type: ModuleType, star: StarLevel) -> bool {
    star.rank() >= minimum_star(module_type).rank()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assessment_is_always_unlocked() {
        assert!(is_unlocked(ModuleType::Assessment, StarLevel::None));
        assert!(is_unlocked(ModuleType::Assessment, StarLevel::Five));
    }

    #[test]
    fn unlock_table_matches_star_ladder() {
        let cases = [
            (ModuleType::Course, StarLevel::None, false),
            (ModuleType::Course, StarLevel::One, true),
            (ModuleType::ExpertSession, StarLevel::One, false),
            (ModuleType::ExpertSession, StarLevel::Two, true),
            (ModuleType::Project, StarLevel::Two, false),
            (ModuleType::Project, StarLevel::Three, true),
            (ModuleType::Interview, StarLevel::Three, false),
            (ModuleType::Interview, StarLevel::Four, true),
            (ModuleType::Interview, StarLevel::Five, true),
        ];
        for (module_type, star, expected) in cases {
            assert_eq!(
                is_unlocked(module_type, star),
                expected,
                "{module_type:?} at {star}"
            );
        }
    }
}
