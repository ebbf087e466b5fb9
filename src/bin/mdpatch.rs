// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use mdpatch::{
    apply::Runner,
    config::{PatchPlan, PlanRule, Swap},
    manifest::WILDCARD,
    patch::ManifestFile,
    path::expand,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::{fs::read_to_string, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  mdpatch [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let lenient = self.command.lenient();
        let result = match self.command {
            Command::Ensure(opts) => run_ensure(opts),
            Command::Remove(opts) => run_remove(opts),
            Command::Version(opts) => run_version(opts),
            Command::Strip(opts) => run_strip(opts),
            Command::Conform(opts) => run_conform(opts),
            Command::Swap(opts) => run_swap(opts),
            Command::Prefix(opts) => run_prefix(opts),
            Command::Show(opts) => run_show(opts),
            Command::Apply(opts) => run_apply(opts),
        };

        match result {
            Err(error) if lenient => {
                warn!("{error:?}");
                Ok(())
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Guarantee that a manifest declares a component type.
    #[command(override_usage = "mdpatch ensure [options] <manifest> <type_name> [<member>]...")]
    Ensure(EnsureOptions),

    /// Guarantee that a manifest does not declare a component type.
    #[command(override_usage = "mdpatch remove [options] <manifest> <type_name>")]
    Remove(RemoveOptions),

    /// Pin a manifest's API version.
    #[command(override_usage = "mdpatch version [options] <manifest> <version>")]
    Version(VersionOptions),

    /// Remove every block of one element from a metadata document.
    #[command(override_usage = "mdpatch strip [options] <file> <element>")]
    Strip(StripOptions),

    /// Conform package version blocks to the installed package version.
    #[command(override_usage = "mdpatch conform [options] <root> <prefix>")]
    Conform(ConformOptions),

    /// Replace literal text across a directory tree.
    #[command(override_usage = "mdpatch swap [options] <root> <from> <to>")]
    Swap(SwapOptions),

    /// Swap a namespace prefix across a directory tree.
    #[command(override_usage = "mdpatch prefix [options] <root> <old> <new>")]
    Prefix(PrefixOptions),

    /// Print the sections a manifest declares.
    #[command(override_usage = "mdpatch show [options] <manifest>")]
    Show(ShowOptions),

    /// Apply every rule of a patch plan.
    #[command(override_usage = "mdpatch apply [options] <plan>")]
    Apply(ApplyOptions),
}

impl Command {
    fn lenient(&self) -> bool {
        match self {
            Command::Ensure(opts) => opts.lenient,
            Command::Remove(opts) => opts.lenient,
            Command::Version(opts) => opts.lenient,
            Command::Strip(opts) => opts.lenient,
            Command::Conform(opts) => opts.lenient,
            Command::Swap(opts) => opts.lenient,
            Command::Prefix(opts) => opts.lenient,
            Command::Show(_) => false,
            Command::Apply(opts) => opts.lenient,
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct EnsureOptions {
    /// Manifest file to patch.
    #[arg(required = true, value_name = "manifest")]
    pub manifest: String,

    /// Component type the manifest must declare.
    #[arg(required = true, value_name = "type_name")]
    pub type_name: String,

    /// Members for a freshly inserted section, the wildcard when omitted.
    #[arg(value_name = "member")]
    pub members: Vec<String>,

    /// Downgrade failures to warnings.
    #[arg(short, long)]
    pub lenient: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Manifest file to patch.
    #[arg(required = true, value_name = "manifest")]
    pub manifest: String,

    /// Component type the manifest must not declare.
    #[arg(required = true, value_name = "type_name")]
    pub type_name: String,

    /// Fail when the section is already absent.
    #[arg(short, long, group = "policy")]
    pub strict: bool,

    /// Downgrade failures to warnings.
    #[arg(short, long, group = "policy")]
    pub lenient: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct VersionOptions {
    /// Manifest file to patch.
    #[arg(required = true, value_name = "manifest")]
    pub manifest: String,

    /// Dotted major.minor version value to pin.
    #[arg(required = true, value_name = "version")]
    pub version: String,

    /// Downgrade failures to warnings.
    #[arg(short, long)]
    pub lenient: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StripOptions {
    /// Metadata document to patch.
    #[arg(required = true, value_name = "file")]
    pub file: String,

    /// Element whose blocks get removed.
    #[arg(required = true, value_name = "element")]
    pub element: String,

    /// Downgrade failures to warnings.
    #[arg(short, long)]
    pub lenient: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConformOptions {
    /// Source tree holding the metadata documents.
    #[arg(required = true, value_name = "root")]
    pub root: String,

    /// Namespace prefix of the managed package.
    #[arg(required = true, value_name = "prefix")]
    pub prefix: String,

    /// File name pattern to sweep.
    #[arg(short, long, value_name = "pattern")]
    pub pattern: Option<String>,

    /// Explicit target version instead of the installed package lookup.
    #[arg(long, value_name = "major.minor")]
    pub package_version: Option<String>,

    /// Downgrade failures to warnings.
    #[arg(short, long)]
    pub lenient: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SwapOptions {
    /// Directory tree to sweep.
    #[arg(required = true, value_name = "root")]
    pub root: String,

    /// Literal text to search for.
    #[arg(required = true, value_name = "from")]
    pub from: String,

    /// Literal text to put in its place.
    #[arg(required = true, value_name = "to")]
    pub to: String,

    /// File name pattern to sweep, every file when omitted.
    #[arg(short, long, value_name = "pattern")]
    pub pattern: Option<String>,

    /// Downgrade failures to warnings.
    #[arg(short, long)]
    pub lenient: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PrefixOptions {
    /// Source tree holding the metadata documents.
    #[arg(required = true, value_name = "root")]
    pub root: String,

    /// Namespace prefix to retire.
    #[arg(required = true, value_name = "old")]
    pub old: String,

    /// Namespace prefix to adopt.
    #[arg(required = true, value_name = "new")]
    pub new: String,

    /// Downgrade failures to warnings.
    #[arg(short, long)]
    pub lenient: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ShowOptions {
    /// Manifest file to inspect.
    #[arg(required = true, value_name = "manifest")]
    pub manifest: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ApplyOptions {
    /// Patch plan file to apply.
    #[arg(required = true, value_name = "plan")]
    pub plan: String,

    /// Home directory that relative rule paths resolve against.
    #[arg(short = 'd', long, value_name = "dir", default_value = ".")]
    pub home: String,

    /// Fail when a removal target is already absent.
    #[arg(short, long, group = "policy")]
    pub strict: bool,

    /// Downgrade failures to warnings.
    #[arg(short, long, group = "policy")]
    pub lenient: bool,
}

fn main() {
    let layer = fmt::layer().compact().with_target(false).without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_ensure(opts: EnsureOptions) -> Result<()> {
    let members = if opts.members.is_empty() {
        vec![WILDCARD.to_owned()]
    } else {
        opts.members
    };
    let rule = PlanRule::EnsureSection {
        manifest: expand(&opts.manifest)?,
        type_name: opts.type_name,
        members,
    };
    Runner::new(".", false).apply_rule(&rule)?;

    Ok(())
}

fn run_remove(opts: RemoveOptions) -> Result<()> {
    let rule = PlanRule::RemoveSection {
        manifest: expand(&opts.manifest)?,
        type_name: opts.type_name,
    };
    Runner::new(".", opts.strict).apply_rule(&rule)?;

    Ok(())
}

fn run_version(opts: VersionOptions) -> Result<()> {
    let rule = PlanRule::SetVersion {
        manifest: expand(&opts.manifest)?,
        version: opts.version,
    };
    Runner::new(".", false).apply_rule(&rule)?;

    Ok(())
}

fn run_strip(opts: StripOptions) -> Result<()> {
    let rule = PlanRule::StripElements {
        file: expand(&opts.file)?,
        element: opts.element,
    };
    Runner::new(".", false).apply_rule(&rule)?;

    Ok(())
}

fn run_conform(opts: ConformOptions) -> Result<()> {
    let rule = PlanRule::Conform {
        root: expand(&opts.root)?,
        prefix: opts.prefix,
        pattern: opts.pattern,
        version: opts.package_version,
    };

    let bar = ProgressBar::no_length();
    let runner = Runner::with_progress(".", false, bar.clone());
    let result = runner.apply_rule(&rule);
    bar.finish_and_clear();
    result?;

    Ok(())
}

fn run_swap(opts: SwapOptions) -> Result<()> {
    let rule = PlanRule::Replace {
        root: expand(&opts.root)?,
        pattern: opts.pattern,
        swaps: vec![Swap::new(opts.from, opts.to)],
    };

    let bar = ProgressBar::no_length();
    let runner = Runner::with_progress(".", false, bar.clone());
    let result = runner.apply_rule(&rule);
    bar.finish_and_clear();
    result?;

    Ok(())
}

fn run_prefix(opts: PrefixOptions) -> Result<()> {
    let rule = PlanRule::PrefixSwap {
        root: expand(&opts.root)?,
        old: opts.old,
        new: opts.new,
    };

    let bar = ProgressBar::no_length();
    let runner = Runner::with_progress(".", false, bar.clone());
    let result = runner.apply_rule(&rule);
    bar.finish_and_clear();
    result?;

    Ok(())
}

fn run_show(opts: ShowOptions) -> Result<()> {
    let manifest = ManifestFile::new(expand(&opts.manifest)?).load()?;
    for section in manifest.sections() {
        println!("{}: {}", section.type_name(), section.members().join(", "));
    }
    println!("version: {}", manifest.version());

    Ok(())
}

fn run_apply(opts: ApplyOptions) -> Result<()> {
    let plan_path = expand(&opts.plan)?;
    let plan: PatchPlan = read_to_string(&plan_path)
        .with_context(|| format!("failed to read plan {}", plan_path.display()))?
        .parse()?;

    let bar = ProgressBar::no_length();
    let runner = Runner::with_progress(expand(&opts.home)?, opts.strict, bar.clone());
    let result = runner.apply(&plan);
    bar.finish_and_clear();
    let summary = result?;

    info!(
        "applied {} rules, {} changed something",
        summary.rules, summary.changed
    );

    Ok(())
}
