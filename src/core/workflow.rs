//! KI-001: Workflow runner. Ordered, nestable, skippable phases.
//!
//! A workflow is a tree of named phases executed depth-first in declaration
//! order. A parent's own action runs before its children. Phases are
//! addressed by dotted paths (`kubeadm.join-worker`); skipping a path skips
//! everything beneath it. The run data is built lazily by the registered
//! initializer, once, right before the first phase action needs it.

use super::error::KubeiError;
use super::rundata::RunData;
use std::collections::HashSet;
use tracing::{debug, info, Dispatch};

/// Action of one phase.
pub type PhaseFn = Box<dyn Fn(&mut dyn RunData) -> Result<(), KubeiError> + Send + Sync>;

/// Builds the run data of one workflow invocation.
pub type DataInitializer = Box<dyn FnOnce() -> Result<Box<dyn RunData>, KubeiError>>;

/// A named step of a workflow, optionally with an action and sub-phases.
pub struct Phase {
    pub name: String,
    pub short: String,
    pub long: String,
    /// Command-line flags of the parent command this phase honours.
    pub inherit_flags: Vec<String>,
    /// Hidden phases run normally but are left out of listings and help.
    pub hidden: bool,
    run: Option<PhaseFn>,
    phases: Vec<Phase>,
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("hidden", &self.hidden)
            .field("has_run", &self.run.is_some())
            .field("phases", &self.phases)
            .finish()
    }
}

impl Phase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            short: String::new(),
            long: String::new(),
            inherit_flags: Vec::new(),
            hidden: false,
            run: None,
            phases: Vec::new(),
        }
    }

    pub fn short(mut self, text: &str) -> Self {
        self.short = text.to_string();
        self
    }

    pub fn long(mut self, text: &str) -> Self {
        self.long = text.to_string();
        self
    }

    pub fn inherit_flags(mut self, flags: &[&str]) -> Self {
        self.inherit_flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn run<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut dyn RunData) -> Result<(), KubeiError> + Send + Sync + 'static,
    {
        self.run = Some(Box::new(action));
        self
    }

    pub fn sub_phase(mut self, phase: Phase) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }
}

/// Executes a tree of phases against one run data value.
#[derive(Default)]
pub struct Runner {
    phases: Vec<Phase>,
    initializer: Option<DataInitializer>,
    data: Option<Box<dyn RunData>>,
    logger: Option<Dispatch>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("phases", &self.phases)
            .field("initialized", &self.data.is_some())
            .finish()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a top-level phase after the ones already appended.
    pub fn append_phase(&mut self, phase: Phase) {
        self.phases.push(phase);
    }

    /// Register the run data builder. Invoked at most once per runner.
    pub fn set_data_initializer<F>(&mut self, init: F)
    where
        F: FnOnce() -> Result<Box<dyn RunData>, KubeiError> + 'static,
    {
        self.initializer = Some(Box::new(init));
    }

    /// Route every log event of a run to `logger` instead of the global
    /// subscriber.
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Dotted paths of every non-hidden phase, depth-first.
    pub fn phase_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_paths(&self.phases, "", false, &mut out);
        out
    }

    /// Indented phase listing with short descriptions and inherited flags.
    pub fn help_text(&self) -> String {
        let mut out = String::from("The workflow runs these phases in order:\n");
        write_help(&self.phases, 0, &mut out);
        out
    }

    /// Check sibling names for uniqueness across the whole tree.
    pub fn validate(&self) -> Result<(), KubeiError> {
        check_unique(&self.phases, "")
    }

    /// Run every phase not excluded by `skip`.
    pub fn run(&mut self, skip: &[String]) -> Result<(), KubeiError> {
        self.validate()?;
        let skip = self.skip_set(skip)?;
        let logger = self.logger.clone();
        let Runner {
            phases,
            initializer,
            data,
            ..
        } = self;
        let mut ctx = Execution {
            skip: &skip,
            initializer,
            data,
        };
        scoped(logger.as_ref(), || {
            for phase in phases.iter() {
                ctx.run_tree(phase, "")?;
            }
            Ok(())
        })
    }

    /// Run the phase at `path` and its non-skipped sub-phases only.
    pub fn run_phase(&mut self, path: &str, skip: &[String]) -> Result<(), KubeiError> {
        self.validate()?;
        let skip = self.skip_set(skip)?;
        let (parent, phase) = find(&self.phases, path).ok_or_else(|| self.unknown(path))?;
        let logger = self.logger.clone();
        let mut ctx = Execution {
            skip: &skip,
            initializer: &mut self.initializer,
            data: &mut self.data,
        };
        scoped(logger.as_ref(), || ctx.run_tree(phase, &parent))
    }

    fn skip_set(&self, skip: &[String]) -> Result<HashSet<String>, KubeiError> {
        let mut all = Vec::new();
        collect_paths(&self.phases, "", true, &mut all);
        let mut set = HashSet::new();
        for entry in skip {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if !all.iter().any(|p| p == entry) {
                return Err(self.unknown(entry));
            }
            set.insert(entry.to_string());
        }
        Ok(set)
    }

    fn unknown(&self, name: &str) -> KubeiError {
        KubeiError::UnknownPhase {
            name: name.to_string(),
            available: self.phase_paths().join(", "),
        }
    }
}

/// Mutable state of one run: skip set plus the lazily-built run data.
struct Execution<'a> {
    skip: &'a HashSet<String>,
    initializer: &'a mut Option<DataInitializer>,
    data: &'a mut Option<Box<dyn RunData>>,
}

impl Execution<'_> {
    fn run_tree(&mut self, phase: &Phase, prefix: &str) -> Result<(), KubeiError> {
        let path = join(prefix, &phase.name);
        if self.skip.contains(&path) {
            info!(phase = %path, "skipping phase");
            return Ok(());
        }
        if let Some(ref action) = phase.run {
            info!(phase = %path, "[{}] running", path);
            let data = self.data()?;
            action(data)?;
            debug!(phase = %path, "phase complete");
        }
        for child in &phase.phases {
            self.run_tree(child, &path)?;
        }
        Ok(())
    }

    fn data(&mut self) -> Result<&mut dyn RunData, KubeiError> {
        if self.data.is_none() {
            let init = self.initializer.take().ok_or(KubeiError::MissingInitializer)?;
            debug!("initializing run data");
            *self.data = Some(init()?);
        }
        match self.data.as_deref_mut() {
            Some(data) => Ok(data),
            None => Err(KubeiError::MissingInitializer),
        }
    }
}

fn scoped<T>(logger: Option<&Dispatch>, body: impl FnOnce() -> T) -> T {
    match logger {
        Some(d) => tracing::dispatcher::with_default(d, body),
        None => body(),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn collect_paths(phases: &[Phase], prefix: &str, include_hidden: bool, out: &mut Vec<String>) {
    for p in phases {
        if p.hidden && !include_hidden {
            continue;
        }
        let path = join(prefix, &p.name);
        out.push(path.clone());
        collect_paths(&p.phases, &path, include_hidden, out);
    }
}

fn check_unique(phases: &[Phase], prefix: &str) -> Result<(), KubeiError> {
    let mut seen = HashSet::new();
    for p in phases {
        let path = join(prefix, &p.name);
        if !seen.insert(p.name.as_str()) {
            return Err(KubeiError::DuplicatePhase(path));
        }
        check_unique(&p.phases, &path)?;
    }
    Ok(())
}

/// Locate a phase by dotted path, returning its parent path alongside.
fn find<'a>(phases: &'a [Phase], path: &str) -> Option<(String, &'a Phase)> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop()?;
    let mut level = phases;
    for segment in &segments {
        level = &level.iter().find(|p| p.name == *segment)?.phases;
    }
    let phase = level.iter().find(|p| p.name == last)?;
    Some((segments.join("."), phase))
}

fn write_help(phases: &[Phase], depth: usize, out: &mut String) {
    for p in phases.iter().filter(|p| !p.hidden) {
        let indent = "  ".repeat(depth + 1);
        let label = format!("{}{}", indent, p.name);
        out.push_str(&format!("{:<30}{}\n", label, p.short));
        if !p.inherit_flags.is_empty() {
            out.push_str(&format!(
                "{:<30}flags: {}\n",
                "",
                p.inherit_flags
                    .iter()
                    .map(|f| format!("--{}", f))
                    .collect::<Vec<_>>()
                    .join(" ")
            ));
        }
        write_help(&p.phases, depth + 1, out);
    }
}
