// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use zcm::{
    config::Settings,
    path::default_config_file,
    store::ManagerStore,
    Backend, CloneEntry, CloneId, ErrorKind, Manager, Migrate, RetentionPolicy, ZfsBackend,
};

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use inquire::Confirm;
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "zcm [options] <zcm-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = match self.config {
            Some(path) => path,
            None => default_config_file()?,
        };
        let settings = Settings::load(config)?;
        let store = ManagerStore::new(ZfsBackend::new(settings.zfs.command.clone()));
        let app = App { settings, store };

        match self.command {
            Command::Ls => app.run_ls(),
            Command::Init(opts) => app.run_init(opts),
            Command::Show(opts) => app.run_show(opts),
            Command::Clone(opts) => app.run_clone(opts),
            Command::Activate(opts) => app.run_activate(opts),
            Command::Rm(opts) => app.run_rm(opts),
            Command::Gc(opts) => app.run_gc(opts),
            Command::Mount(opts) => app.run_mount(opts),
            Command::Umount(opts) => app.run_umount(opts),
            Command::Destroy(opts) => app.run_destroy(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List every clone manager on this host.
    #[command(override_usage = "zcm ls")]
    Ls,

    /// Initialize new clone manager.
    #[command(override_usage = "zcm init [options] <dataset> <path>")]
    Init(InitOptions),

    /// Show clones of a manager.
    #[command(override_usage = "zcm show <dataset>")]
    Show(ManagerOptions),

    /// Snapshot the active clone into a new clone.
    #[command(override_usage = "zcm clone [options] <dataset>")]
    Clone(CloneOptions),

    /// Mount a clone at the managed path.
    #[command(override_usage = "zcm activate [options] <dataset> <clone_id>")]
    Activate(ActivateOptions),

    /// Remove clones.
    #[command(override_usage = "zcm rm <dataset> <clone_id>...")]
    Rm(RemoveOptions),

    /// Evict clones until the retention policy holds.
    #[command(override_usage = "zcm gc [options] <dataset>")]
    Gc(GcOptions),

    /// Mount every dataset of a manager.
    #[command(override_usage = "zcm mount <dataset>")]
    Mount(ManagerOptions),

    /// Unmount every dataset of a manager.
    #[command(override_usage = "zcm umount <dataset>")]
    Umount(ManagerOptions),

    /// Destroy a manager with all of its clones.
    #[command(override_usage = "zcm destroy [options] <dataset>")]
    Destroy(DestroyOptions),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MigrateArg {
    /// Adopt existing dataset as root clone.
    Backend,

    /// Copy existing directory into root clone.
    Path,
}

impl From<MigrateArg> for Migrate {
    fn from(arg: MigrateArg) -> Self {
        match arg {
            MigrateArg::Backend => Migrate::Backend,
            MigrateArg::Path => Migrate::Path,
        }
    }
}

#[derive(Args, Clone, Debug)]
struct RetentionOptions {
    /// Maximum number of clones older than the active clone.
    #[arg(long, value_name = "count")]
    pub max_older: Option<usize>,

    /// Maximum number of clones newer than the active clone.
    #[arg(long, value_name = "count")]
    pub max_newer: Option<usize>,

    /// Maximum number of clones overall.
    #[arg(long, value_name = "count")]
    pub max_total: Option<usize>,

    /// Evict clones instead of rejecting the command.
    #[arg(short, long)]
    pub auto_remove: bool,
}

impl RetentionOptions {
    fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_older: self.max_older,
            max_newer: self.max_newer,
            max_total: self.max_total,
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ManagerOptions {
    /// Managed root dataset.
    #[arg(required = true, value_name = "dataset")]
    pub dataset: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Managed root dataset to create.
    #[arg(required = true, value_name = "dataset")]
    pub dataset: String,

    /// Path where the active clone is mounted.
    #[arg(required = true, value_name = "path")]
    pub path: PathBuf,

    /// Adopt existing data into the new manager.
    #[arg(short, long, value_enum, value_name = "source")]
    pub migrate: Option<MigrateArg>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneOptions {
    /// Managed root dataset.
    #[arg(required = true, value_name = "dataset")]
    pub dataset: String,

    #[command(flatten)]
    pub retention: RetentionOptions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ActivateOptions {
    /// Managed root dataset.
    #[arg(required = true, value_name = "dataset")]
    pub dataset: String,

    /// Clone to activate.
    #[arg(required = true, value_name = "clone_id")]
    pub clone_id: CloneId,

    #[command(flatten)]
    pub retention: RetentionOptions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Managed root dataset.
    #[arg(required = true, value_name = "dataset")]
    pub dataset: String,

    /// Clones to remove.
    #[arg(required = true, value_name = "clone_id")]
    pub clone_ids: Vec<CloneId>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GcOptions {
    /// Managed root dataset.
    #[arg(required = true, value_name = "dataset")]
    pub dataset: String,

    #[command(flatten)]
    pub retention: RetentionOptions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DestroyOptions {
    /// Managed root dataset.
    #[arg(required = true, value_name = "dataset")]
    pub dataset: String,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

struct App {
    settings: Settings,
    store: ManagerStore<ZfsBackend>,
}

impl App {
    fn policy(&self, opts: &RetentionOptions) -> (RetentionPolicy, bool) {
        let policy = self.settings.retention.policy().overridden_by(opts.policy());
        let auto_remove = opts.auto_remove || self.settings.retention.auto_remove;
        (policy, auto_remove)
    }

    fn run_ls(&self) -> Result<()> {
        for manager in self.store.managers()? {
            let active = manager
                .active_clone()
                .map_or_else(|| "-".to_owned(), |clone| clone.id.to_string());
            println!(
                "{}\t{}\t{} clones\tactive {}\t{} bytes",
                manager.backend_id(),
                manager.public_path().display(),
                manager.clones().len(),
                active,
                manager.size(),
            );
        }

        Ok(())
    }

    fn run_init(&self, opts: InitOptions) -> Result<()> {
        let manager = self
            .store
            .initialize(&opts.dataset, &opts.path, opts.migrate.map(Into::into))
            .map_err(explain)?;
        show(&manager);

        Ok(())
    }

    fn run_show(&self, opts: ManagerOptions) -> Result<()> {
        let manager = self.store.open(&opts.dataset).map_err(explain)?;
        show(&manager);

        Ok(())
    }

    fn run_clone(&self, opts: CloneOptions) -> Result<()> {
        let (policy, auto_remove) = self.policy(&opts.retention);
        let mut manager = self.store.open(&opts.dataset).map_err(explain)?;
        let clone = manager
            .create_clone(policy, auto_remove)
            .map_err(explain)?;
        println!("{}", clone.id);

        Ok(())
    }

    fn run_activate(&self, opts: ActivateOptions) -> Result<()> {
        let (policy, auto_remove) = self.policy(&opts.retention);
        let mut manager = self.store.open(&opts.dataset).map_err(explain)?;
        manager
            .activate(opts.clone_id, policy, auto_remove)
            .map_err(explain)?;

        Ok(())
    }

    fn run_rm(&self, opts: RemoveOptions) -> Result<()> {
        let mut manager = self.store.open(&opts.dataset).map_err(explain)?;
        for id in opts.clone_ids {
            manager.remove(id).map_err(explain)?;
        }

        Ok(())
    }

    fn run_gc(&self, opts: GcOptions) -> Result<()> {
        let (policy, _) = self.policy(&opts.retention);
        let mut manager = self.store.open(&opts.dataset).map_err(explain)?;
        for id in manager.auto_remove(policy).map_err(explain)? {
            println!("{id}");
        }

        Ok(())
    }

    fn run_mount(&self, opts: ManagerOptions) -> Result<()> {
        let mut manager = self.store.open(&opts.dataset).map_err(explain)?;
        manager.mount().map_err(explain)?;

        Ok(())
    }

    fn run_umount(&self, opts: ManagerOptions) -> Result<()> {
        let mut manager = self.store.open(&opts.dataset).map_err(explain)?;
        manager.unmount().map_err(explain)?;

        Ok(())
    }

    fn run_destroy(&self, opts: DestroyOptions) -> Result<()> {
        let manager = self.store.open(&opts.dataset).map_err(explain)?;

        if !opts.yes {
            let prompt = format!(
                "Destroy {} and all {} of its clones?",
                manager.backend_id(),
                manager.clones().len()
            );
            if !Confirm::new(&prompt).with_default(false).prompt()? {
                info!("destroy cancelled");
                return Ok(());
            }
        }

        let teardown = manager.destroy().map_err(explain)?;
        for leftover in teardown.leftover {
            info!("directory {} left behind", leftover.display());
        }

        Ok(())
    }
}

fn show<B: Backend>(manager: &Manager<B>) {
    println!(
        "{} at {}",
        manager.backend_id(),
        manager.public_path().display()
    );

    let active = manager.active_clone().map(|clone| clone.id);
    for clone in manager.clones() {
        let marker = if Some(clone.id) == active { "*" } else { " " };
        println!("{marker} {}", describe(clone));
    }
}

fn describe(clone: &CloneEntry) -> String {
    let created = clone
        .created()
        .map_or_else(|| "-".to_owned(), |date| date.format("%Y-%m-%d %H:%M:%S").to_string());
    let origin = clone
        .origin_id
        .map_or_else(|| "-".to_owned(), |id| id.to_string());

    format!(
        "{}\t{created}\torigin {origin}\t{} bytes",
        clone.id, clone.used_bytes
    )
}

fn explain(error: zcm::Error) -> anyhow::Error {
    match error {
        zcm::Error::PolicyViolation { .. } => {
            anyhow!("{error}, raise the limit or pass --auto-remove")
        }
        error if error.kind() == ErrorKind::Business => anyhow!("{error}, nothing to do"),
        error => anyhow::Error::new(error),
    }
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = Cli::parse().run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}
