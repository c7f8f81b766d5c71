use crate::tables;
use anyhow::Result;
use playground_recipes::builtin_recipes;

pub fn run() -> Result<()> {
    println!("{}", tables::recipes(&builtin_recipes()));
    Ok(())
}
