//! The `simtask` binary, serving the workload emulator.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    tracexec_server::cli::execute()
}
