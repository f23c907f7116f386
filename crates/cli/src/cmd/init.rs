//! Implementation of the `stack init` command.

use std::path::Path;

use anyhow::{Context, Result};

use stacklua_lib::init::scaffold;

use crate::output::{print_info, print_success};

pub fn cmd_init(dir: &Path) -> Result<()> {
  let written = scaffold(dir).context("failed to scaffold project")?;

  if written.is_empty() {
    print_info("nothing to do; files already exist");
    return Ok(());
  }

  for path in &written {
    print_success(&format!("wrote {}", path.display()));
  }

  println!();
  print_info("next: copy secrets.example.yaml to secrets.yaml, then run `stack synth`");

  Ok(())
}
