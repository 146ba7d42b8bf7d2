//! Common test utilities for dedupctl integration tests.

use clap::Parser;
use dedupctl::cli::Cli;
use dedupctl::{CtlConfig, MockBackend, Result};

/// Outcome of one invocation against an in-memory backend.
pub struct Invocation {
    pub result: Result<()>,
    pub stdout: String,
}

impl Invocation {
    pub fn exit_code(&self) -> i32 {
        match self.result {
            Ok(()) => 0,
            Err(ref e) => e.exit_code(),
        }
    }
}

/// Run a command line (without the program name) against `backend`, the way
/// the binary does, minus opening the path.
pub fn invoke(backend: &mut MockBackend, args: &[&str]) -> Invocation {
    let argv: Vec<&str> = std::iter::once("dedupctl").chain(args.iter().copied()).collect();
    let cli = Cli::try_parse_from(argv).expect("argument shape should be valid");
    let mut out = Vec::new();
    let result = cli
        .command
        .prepare(&CtlConfig::default())
        .and_then(|request| request.send(backend, &mut out));
    Invocation {
        result,
        stdout: String::from_utf8(out).expect("status output is utf-8"),
    }
}
