//! Code Safety Gate
//!
//! Two-phase pattern gate over model-authored plotting scripts: a case-insensitive
//! denylist scan followed by a contract check (the script must reference a plotting
//! library and save its figure). This is a coarse substring filter; the child-process
//! sandbox is the primary boundary.
//!
//! Code only reaches the executor as [`VettedCode`], which is constructed exclusively by
//! [`CodeSafetyValidator::vet`].

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Forbidden substrings, matched case-insensitively
pub const DENYLIST: &[&str] = &[
    "import os",
    "import sys",
    "import subprocess",
    "import socket",
    "import requests",
    "import urllib",
    "import shutil",
    "import ctypes",
    "import pickle",
    "from os",
    "from subprocess",
    "from socket",
    "open(",
    "exec(",
    "eval(",
    "__import__",
    "getattr",
    "setattr",
    "delattr",
    "compile(",
    "globals()",
    "locals()",
    "vars(",
];

/// Result of a safety check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub reason: String,
}

impl SafetyVerdict {
    fn accept() -> Self {
        Self {
            safe: true,
            reason: String::new(),
        }
    }

    fn reject(reason: String) -> Self {
        Self {
            safe: false,
            reason,
        }
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.safe {
            write!(f, "safe")
        } else {
            write!(f, "rejected: {}", self.reason)
        }
    }
}

/// Script text that passed the safety gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VettedCode(String);

impl VettedCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for VettedCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct CodeSafetyValidator {
    denylist: Vec<&'static str>,
}

impl Default for CodeSafetyValidator {
    fn default() -> Self {
        Self {
            denylist: DENYLIST.to_vec(),
        }
    }
}

impl CodeSafetyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denylist(&self) -> &[&'static str] {
        &self.denylist
    }

    pub fn validate(&self, code: &str) -> SafetyVerdict {
        let lowered = code.to_lowercase();

        // Denylist entries are already lowercase.
        if let Some(token) = self.denylist.iter().find(|token| lowered.contains(*token)) {
            debug!(token = *token, "Rejected script on denylisted token");
            return SafetyVerdict::reject(format!("Code contains forbidden operation: {}", token));
        }

        if !lowered.contains("matplotlib") && !lowered.contains("plt.") {
            return SafetyVerdict::reject(
                "Code does not reference a plotting library (matplotlib)".to_string(),
            );
        }

        if !lowered.contains("savefig") && !lowered.contains("save") {
            return SafetyVerdict::reject(
                "Code does not save the figure (plt.savefig)".to_string(),
            );
        }

        SafetyVerdict::accept()
    }

    /// Validate and, on success, wrap the code for execution
    pub fn vet(&self, code: impl Into<String>) -> Result<VettedCode, SafetyVerdict> {
        let code = code.into();
        let verdict = self.validate(&code);
        if verdict.safe {
            Ok(VettedCode(code))
        } else {
            Err(verdict)
        }
    }
}
