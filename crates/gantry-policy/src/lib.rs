//! Input safety checks for commands assembled from caller-supplied strings.
//!
//! Every check is a pure function returning `Result<(), PolicyViolation>`;
//! run them before handing values to the process runner.

pub mod command;
pub mod guard;
pub mod mount;
pub mod net;
pub mod path;
pub mod violation;

pub use command::{
    CommandAllowlist, assert_allowed_command, assert_no_flag_injection,
    assert_no_path_qualified_command, assert_no_shell_positionals,
};
pub use guard::{PolicyGuard, WORKDIR_POLICY};
pub use mount::assert_safe_volume_mount;
pub use net::{assert_safe_header, assert_safe_url, assert_valid_port_mapping};
pub use path::{AllowedRoots, assert_allowed_root, assert_safe_file_path, normalize};
pub use violation::{PolicyViolation, ViolationKind};
