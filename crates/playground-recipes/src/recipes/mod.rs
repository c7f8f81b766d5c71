//! Built-in recipes and lookup by name or YAML path.

mod buildernet;
mod l1;
mod opstack;

pub use buildernet::BuilderNetRecipe;
pub use l1::L1Recipe;
pub use opstack::OpStackRecipe;

use crate::yaml::YamlRecipe;
use crate::{Error, Recipe, Result};
use std::path::Path;
use std::sync::Arc;

/// Every built-in recipe
pub fn builtin_recipes() -> Vec<Arc<dyn Recipe>> {
    vec![Arc::new(L1Recipe), Arc::new(OpStackRecipe), Arc::new(BuilderNetRecipe)]
}

/// Built-in recipe by name
pub fn find_recipe(name: &str) -> Result<Arc<dyn Recipe>> {
    builtin_recipes()
        .into_iter()
        .find(|r| r.name() == name)
        .ok_or_else(|| Error::UnknownRecipe(name.to_string()))
}

/// Built-in recipe by name, or a YAML recipe when `arg` names a `.yaml`/`.yml` file
pub fn load_recipe(arg: &str) -> Result<Arc<dyn Recipe>> {
    let path = Path::new(arg);
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        Ok(Arc::new(YamlRecipe::from_file(path)?))
    } else {
        find_recipe(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let names: Vec<_> = builtin_recipes().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["l1", "opstack", "buildernet"]);
        assert_eq!(find_recipe("opstack").unwrap().name(), "opstack");
        assert!(matches!(find_recipe("l3"), Err(Error::UnknownRecipe(_))));
        assert!(matches!(load_recipe("l3"), Err(Error::UnknownRecipe(_))));
    }

    #[test]
    fn test_missing_yaml_file() {
        assert!(matches!(load_recipe("/nonexistent/recipe.yaml"), Err(Error::Io(_))));
    }
}
