//! Shared constants.

/// Length of the truncated object hash used for content addressing.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Default configuration file name.
pub const DEFAULT_CONFIG: &str = "stack.lua";

/// Default secret store file name, resolved next to the config file.
pub const DEFAULT_SECRETS: &str = "secrets.yaml";

/// File name of the synthesized template inside the out directory.
pub const TEMPLATE_FILENAME: &str = "stack.template.json";

/// CloudFormation template format version emitted by synthesis.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Canonical artifact names for the three-stage pipeline.
pub const SOURCE_ARTIFACT: &str = "source";
pub const BUILD_ARTIFACT: &str = "build";

/// Secret fields required by the GitHub source action.
pub const GITHUB_TOKEN_FIELD: &str = "GITHUB_TOKEN";
pub const GITHUB_REPO_FIELD: &str = "GITHUB_REPO";
pub const GITHUB_OWNER_FIELD: &str = "GITHUB_OWNER";
