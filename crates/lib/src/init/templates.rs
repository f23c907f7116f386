//! Template content for the `stack init` command.

/// Template for the stack.lua entry point.
pub const STACK_LUA_TEMPLATE: &str =
  include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../lua/template.lua"));

/// Example secret store, written as `secrets.example.yaml` so real
/// credentials never land in a scaffolded file by accident.
pub const SECRETS_EXAMPLE: &str = r#"# Rename to secrets.yaml and fill in real values.
# secrets.yaml should stay out of version control.
deploy/github:
  GITHUB_OWNER: your-github-org
  GITHUB_REPO: your-repo-name
  GITHUB_TOKEN: ghp_replace_me
"#;
