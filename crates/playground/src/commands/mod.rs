pub mod list;
pub mod start;
pub mod stop;
pub mod validate;

use anyhow::{Context, Result};
use playground_recipes::{FlagSet, Recipe, load_recipe};
use std::sync::Arc;

/// Load a recipe and apply `key=value` flag assignments to its defaults
pub fn recipe_with_flags(arg: &str, assignments: &[String]) -> Result<(Arc<dyn Recipe>, FlagSet)> {
    let recipe = load_recipe(arg).with_context(|| format!("Failed to load recipe {}", arg))?;
    let mut flags = recipe.flags();
    for assignment in assignments {
        flags
            .set(assignment)
            .with_context(|| format!("Invalid flag for recipe {}: {}", recipe.name(), assignment))?;
    }
    Ok((recipe, flags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_applied() {
        let (recipe, flags) = recipe_with_flags("opstack", &["block-time=1".to_string()]).unwrap();
        assert_eq!(recipe.name(), "opstack");
        assert_eq!(flags.get_int("block-time"), Some(1));
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        let Err(err) = recipe_with_flags("l1", &["no-such-flag=1".to_string()]) else {
            panic!("expected an unknown flag error");
        };
        assert!(err.to_string().contains("Invalid flag for recipe l1"));
    }
}
