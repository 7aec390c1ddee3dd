//! Static descriptions of the command-line engines.
//!
//! Every supported filter is driven the same way: run a program with some
//! arguments, hand it a message (as a path or on stdin), and read the
//! verdict back from the exit status or the output. The differences live
//! in these tables; [`CommandEngine`](super::CommandEngine) does the rest.

use crate::config::EngineOptions;
use crate::engine::{Meat, Verdict};

/// How a message reaches the engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message path, as one argument.
    PathArg,
    /// The message contents, piped to stdin.
    Stdin,
}

/// How training messages are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainMode {
    /// One process per message.
    PerMessage(Delivery),
    /// Paths are collected and passed as arguments in chunks at sync time.
    /// Chunk size comes from [`EngineOptions::batch_size`].
    Batched,
    /// One long-lived process reading one path per line on stdin.
    PathStream,
}

/// Arguments selecting the class being learned.
#[derive(Debug, Clone, Copy)]
pub struct MeatArgs {
    pub learn: &'static [&'static str],
    /// Prepended to `learn` when retraining.
    pub unlearn: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct TrainSpec {
    pub program: &'static str,
    pub prefix: &'static [&'static str],
    pub spam: MeatArgs,
    pub ham: MeatArgs,
    pub suffix: &'static [&'static str],
    pub mode: TrainMode,
    /// Full command lines run in order once training input is complete.
    pub sync: &'static [&'static [&'static str]],
}

impl TrainSpec {
    /// Argument list for one training batch.
    pub fn args(&self, meat: Meat, retrain: bool) -> Vec<String> {
        let meat_args = match meat {
            Meat::Spam => &self.spam,
            Meat::Ham => &self.ham,
        };
        let unlearn: &[&str] = if retrain { meat_args.unlearn } else { &[] };

        self.prefix
            .iter()
            .chain(unlearn)
            .chain(meat_args.learn)
            .chain(self.suffix)
            .map(|s| s.to_string())
            .collect()
    }
}

/// How an engine's answer is turned into a [`Verdict`].
#[derive(Debug, Clone, Copy)]
pub enum Decoder {
    /// Verdict from the exit code. `evidence` is the index of a required
    /// whitespace-separated stdout field.
    ExitStatus {
        codes: &'static [(i32, Verdict)],
        evidence: Option<usize>,
    },
    /// Verdict from a header in the message echoed on stdout.
    Header {
        name: &'static str,
        spam: &'static str,
        ham: &'static str,
    },
    /// `score/threshold` on stdout, spamc style.
    SpamcScore,
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifySpec {
    pub program: &'static str,
    pub args: &'static [&'static str],
    /// Extra leading arguments computed from the runtime options.
    pub runtime_args: Option<fn(&EngineOptions) -> Vec<String>>,
    pub delivery: Delivery,
    pub decoder: Decoder,
}

impl ClassifySpec {
    pub fn args(&self, options: &EngineOptions) -> Vec<String> {
        let mut args = self.runtime_args.map(|f| f(options)).unwrap_or_default();
        args.extend(self.args.iter().map(|s| s.to_string()));
        args
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSpec {
    pub name: &'static str,
    pub train: TrainSpec,
    pub classify: ClassifySpec,
}

pub static SYLFILTER: EngineSpec = EngineSpec {
    name: "sylfilter",
    train: TrainSpec {
        program: "sylfilter",
        prefix: &[],
        spam: MeatArgs {
            learn: &["-j"],
            unlearn: &["-C"],
        },
        ham: MeatArgs {
            learn: &["-c"],
            unlearn: &["-J"],
        },
        suffix: &[],
        mode: TrainMode::Batched,
        sync: &[],
    },
    classify: ClassifySpec {
        program: "sylfilter",
        args: &["-t"],
        runtime_args: None,
        delivery: Delivery::PathArg,
        decoder: Decoder::ExitStatus {
            codes: &[(0, Verdict::Spam), (1, Verdict::Ham), (2, Verdict::Unknown)],
            evidence: None,
        },
    },
};

pub static BOGOFILTER: EngineSpec = EngineSpec {
    name: "bogofilter",
    train: TrainSpec {
        program: "bogofilter",
        prefix: &[],
        spam: MeatArgs {
            learn: &["-s"],
            unlearn: &["-N"],
        },
        ham: MeatArgs {
            learn: &["-n"],
            unlearn: &["-S"],
        },
        suffix: &[],
        mode: TrainMode::PerMessage(Delivery::Stdin),
        sync: &[],
    },
    classify: ClassifySpec {
        program: "bogofilter",
        args: &["-T"],
        runtime_args: None,
        delivery: Delivery::Stdin,
        decoder: Decoder::ExitStatus {
            codes: &[(0, Verdict::Spam), (1, Verdict::Ham), (2, Verdict::Unknown)],
            evidence: Some(1),
        },
    },
};

pub static BSFILTER: EngineSpec = EngineSpec {
    name: "bsfilter",
    train: TrainSpec {
        program: "bsfilter",
        prefix: &[],
        spam: MeatArgs {
            learn: &["-s"],
            unlearn: &["-C"],
        },
        ham: MeatArgs {
            learn: &["-c"],
            unlearn: &["-S"],
        },
        suffix: &[],
        mode: TrainMode::PerMessage(Delivery::PathArg),
        sync: &[&["bsfilter", "--update"]],
    },
    classify: ClassifySpec {
        program: "bsfilter",
        args: &[],
        runtime_args: None,
        delivery: Delivery::PathArg,
        decoder: Decoder::ExitStatus {
            codes: &[(0, Verdict::Spam), (1, Verdict::Ham)],
            evidence: Some(4),
        },
    },
};

pub static SPAMASSASSIN: EngineSpec = EngineSpec {
    name: "spamassassin",
    train: TrainSpec {
        program: "sa-learn",
        prefix: &["--local", "--progress", "--no-sync"],
        spam: MeatArgs {
            learn: &["--spam"],
            unlearn: &[],
        },
        ham: MeatArgs {
            learn: &["--ham"],
            unlearn: &[],
        },
        suffix: &["-f", "-"],
        mode: TrainMode::PathStream,
        sync: &[&["sa-learn", "--sync"]],
    },
    classify: ClassifySpec {
        program: "spamc",
        args: &["--check"],
        runtime_args: Some(spamc_args),
        delivery: Delivery::Stdin,
        decoder: Decoder::SpamcScore,
    },
};

pub static CRM114: EngineSpec = EngineSpec {
    name: "crm114",
    train: TrainSpec {
        program: "mailreaver.crm",
        prefix: &[],
        spam: MeatArgs {
            learn: &["--spam"],
            unlearn: &[],
        },
        ham: MeatArgs {
            learn: &["--good"],
            unlearn: &[],
        },
        suffix: &[],
        mode: TrainMode::PerMessage(Delivery::Stdin),
        sync: &[],
    },
    classify: ClassifySpec {
        program: "mailreaver.crm",
        args: &[],
        runtime_args: None,
        delivery: Delivery::Stdin,
        decoder: Decoder::Header {
            name: "X-CRM114-Status:",
            spam: "SPAM",
            ham: "Good",
        },
    },
};

pub static QSF: EngineSpec = EngineSpec {
    name: "qsf",
    train: TrainSpec {
        program: "qsf",
        prefix: &["-a"],
        spam: MeatArgs {
            learn: &["--mark-spam"],
            unlearn: &[],
        },
        ham: MeatArgs {
            learn: &["--mark-nonspam"],
            unlearn: &[],
        },
        suffix: &[],
        mode: TrainMode::PerMessage(Delivery::Stdin),
        sync: &[],
    },
    classify: ClassifySpec {
        program: "qsf",
        args: &["-a"],
        runtime_args: None,
        delivery: Delivery::Stdin,
        decoder: Decoder::Header {
            name: "X-Spam:",
            spam: "YES",
            ham: "NO",
        },
    },
};

/// All command engines shipped with notspam.
pub static BUILTIN: &[&EngineSpec] = &[
    &BOGOFILTER,
    &BSFILTER,
    &CRM114,
    &QSF,
    &SPAMASSASSIN,
    &SYLFILTER,
];

fn spamc_args(options: &EngineOptions) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(socket) = &options.spamd_socket {
        args.push(format!("--socket={}", socket.display()));
    }
    args.push("--log-to-stderr".to_string());
    args.push(format!("--max-size={}", options.spamc_max_size));
    args
}
