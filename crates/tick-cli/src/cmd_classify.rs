use std::path::{Path, PathBuf};

use anyhow::Result;
use tick_lang::TaskType;

use crate::load_rule;

pub fn run(rule: PathBuf) -> Result<()> {
    println!("{}", classify_file(&rule)?);
    Ok(())
}

pub fn classify_file(path: &Path) -> Result<TaskType> {
    Ok(load_rule(path)?.task_type())
}
