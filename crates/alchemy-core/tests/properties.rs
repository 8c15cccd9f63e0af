//! Property tests for keys and safety checks.

use alchemy_core::{
    Path, Step, contains_child_exploitation, fold_name, is_safe_substitute, normalize,
    safe_substitute, validate_name,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::SmallRng;

proptest! {
    #[test]
    fn normalize_is_symmetric(a in "\\PC{0,40}", b in "\\PC{0,40}") {
        prop_assert_eq!(normalize(&a, &b), normalize(&b, &a));
    }

    #[test]
    fn normalize_ignores_case_and_outer_whitespace(
        a in "[a-zA-Z][a-zA-Z ]{0,20}[a-zA-Z]",
        b in "[a-zA-Z]{1,20}",
        pad in " {0,4}",
    ) {
        let padded = format!("{pad}{}{pad}", a.to_uppercase());
        prop_assert_eq!(normalize(&a, &b), normalize(&padded, &b.to_lowercase()));
    }

    #[test]
    fn fold_is_idempotent(a in "[a-zA-Z0-9 _éÉ\t]{0,40}") {
        let once = fold_name(&a);
        prop_assert_eq!(fold_name(&once), once);
    }

    #[test]
    fn key_has_exactly_one_separator_for_plain_names(
        a in "[a-z ]{1,20}",
        b in "[a-z ]{1,20}",
    ) {
        prop_assert_eq!(normalize(&a, &b).matches('+').count(), 1);
    }

    #[test]
    fn name_length_limit(n in 1usize..150) {
        let name = "x".repeat(n);
        prop_assert_eq!(validate_name(&name).is_ok(), n <= 100);
    }

    #[test]
    fn substitutes_are_always_safe(seed in any::<u64>()) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let (name, _) = safe_substitute(&mut rng);
        prop_assert!(is_safe_substitute(name));
        prop_assert!(!contains_child_exploitation(name));
    }
}

#[test]
fn single_starter_step_paths_are_rooted() {
    let starters = ["Earth", "Water", "Fire", "Wind"];
    for a in starters {
        for b in starters {
            let p = Path::new(vec![Step::new(a, b, "Thing", "✨")]);
            assert!(p.is_rooted(), "{a} + {b}");
        }
    }
}
