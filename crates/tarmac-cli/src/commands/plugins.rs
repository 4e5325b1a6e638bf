//! `tarmac plugins` command - List the bundled hooks.

use tarmac_core::HookRegistry;
use tarmac_core::plugins::register_builtin;
use tarmac_git::BranchHandle;

use crate::output;

#[allow(clippy::unnecessary_wraps)]
pub fn run() -> anyhow::Result<()> {
    let mut registry = HookRegistry::<BranchHandle>::new();
    register_builtin(&mut registry);

    for (point, name) in registry.describe() {
        output::essential(&format!("{:<12} {name}", point.as_str()));
    }
    Ok(())
}
