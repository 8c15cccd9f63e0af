//! Prompt construction for the model gateway.

use std::fmt::Write;

use crate::combination::Combination;
use crate::constants::STARTERS;

fn format_example(c: &Combination) -> String {
    format!(
        "{} + {} = {} {}",
        c.input_a, c.input_b, c.result_name, c.result_glyph
    )
}

fn starter_list() -> String {
    STARTERS
        .iter()
        .map(|(name, glyph)| format!("{name} {glyph}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Prompt asking for the single result of combining `a` and `b`.
///
/// `examples` are existing combinations near the pair, shown so new results
/// stay consistent in tone and granularity.
pub fn combination_prompt(a: &str, b: &str, examples: &[Combination]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are the rules engine of an element-combining word game. \
         Players start from four elements and combine pairs to discover new ones.\n\
         Rules:\n\
         - Answer with the single most intuitive, family-friendly result of combining the two elements.\n\
         - The result is a common noun or well-known concept, at most 100 characters, in Title Case.\n\
         - Never answer with one of the starter elements.\n\
         - The glyph is exactly one emoji.\n\
         - Reply with JSON only: {\"name\": \"...\", \"glyph\": \"...\"}\n",
    );
    let _ = writeln!(prompt, "Starter elements: {}", starter_list());
    if !examples.is_empty() {
        prompt.push_str("\nExisting combinations for reference:\n");
        for example in examples {
            let _ = writeln!(prompt, "- {}", format_example(example));
        }
    }
    let _ = write!(prompt, "\nCombine: {a} + {b}");
    prompt
}

/// Prompt asking for `count` distinct solution paths ending at `target`.
pub fn path_prompt(target: &str, count: usize, context: &[Combination]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You design daily puzzles for an element-combining word game. \
         Produce {count} distinct solution paths that reach the target element \"{target}\"."
    );
    let _ = writeln!(prompt, "Starter elements: {}", starter_list());
    prompt.push_str(
        "Rules:\n\
         - A path is an ordered list of steps; each step combines two elements into a result.\n\
         - Every input must be a starter element or the result of an earlier step in the same path.\n\
         - The last step's result must be the target.\n\
         - Never produce a starter element as a result.\n\
         - Each result has exactly one emoji glyph; reuse the glyph of any element already listed below.\n\
         - Prefer reusing the existing combinations below over inventing new ones, and never \
           contradict them (the same pair must always give the same result).\n\
         - Keep paths short: usually 4 to 12 steps.\n\
         Reply with JSON only:\n\
         {\"paths\": [{\"steps\": [{\"a\": \"...\", \"b\": \"...\", \"result\": \"...\", \"glyph\": \"...\"}]}]}\n",
    );
    if !context.is_empty() {
        prompt.push_str("\nExisting combinations (most used first):\n");
        for c in context {
            let _ = writeln!(prompt, "- {}", format_example(c));
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::Origin;

    #[test]
    fn test_combination_prompt_mentions_inputs() {
        let p = combination_prompt("Water", "Fire", &[]);
        assert!(p.ends_with("Combine: Water + Fire"));
        assert!(p.contains("Earth 🌍"));
        assert!(!p.contains("Existing combinations"));
    }

    #[test]
    fn test_combination_prompt_examples() {
        let ex = Combination::new("Earth", "Water", "Mud", "🟫", Origin::ModelGenerated, "t");
        let p = combination_prompt("Mud", "Fire", &[ex]);
        assert!(p.contains("- Earth + Water = Mud 🟫"));
    }

    #[test]
    fn test_path_prompt() {
        let ex = Combination::new("Water", "Fire", "Steam", "♨️", Origin::ModelGenerated, "t");
        let p = path_prompt("Cloud", 3, &[ex]);
        assert!(p.contains("Produce 3 distinct solution paths"));
        assert!(p.contains("\"Cloud\""));
        assert!(p.contains("- Water + Fire = Steam ♨️"));
    }
}
