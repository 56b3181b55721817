// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! ZFS backend.
//!
//! Drives the `zfs(8)` command line tool. Every primitive maps onto exactly
//! one `zfs` invocation, run to completion in the calling thread. Listings use
//! scripted mode (`-H`) with parsable numbers (`-p`) so that output can be
//! split on tabs without guessing at column widths.
//!
//! # See Also
//!
//! - [Man page zfs](https://openzfs.github.io/openzfs-docs/man/master/8/zfs.8.html)

use crate::backend::{Backend, DatasetInfo, Error, Result, MOUNTPOINT};

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

const LIST_COLUMNS: [&str; 6] = ["name", "origin", "mountpoint", "mounted", "creation", "used"];

/// Backend that shells out to the `zfs` binary.
#[derive(Debug, Clone)]
pub struct ZfsBackend {
    command: PathBuf,
}

impl ZfsBackend {
    /// Construct new ZFS backend using given `zfs` binary.
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn zfs(&self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Result<String> {
        syscall_non_interactive(&self.command, args.into_iter().map(Into::into))
    }
}

impl Default for ZfsBackend {
    fn default() -> Self {
        Self::new("zfs")
    }
}

impl Backend for ZfsBackend {
    #[instrument(skip(self), level = "debug")]
    fn list(
        &self,
        root: Option<&str>,
        properties: &[&str],
        recursive: bool,
    ) -> Result<Vec<DatasetInfo>> {
        let columns = LIST_COLUMNS
            .iter()
            .chain(properties.iter())
            .copied()
            .collect::<Vec<_>>()
            .join(",");

        let mut args: Vec<OsString> = vec![
            "list".into(),
            "-H".into(),
            "-p".into(),
            "-t".into(),
            "filesystem".into(),
            "-s".into(),
            "name".into(),
            "-o".into(),
            columns.into(),
        ];
        if recursive {
            args.push("-r".into());
        }
        if let Some(root) = root {
            args.push(root.into());
        }

        let output = self.zfs(args)?;
        let mut datasets = output
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| parse_list_line(line, properties))
            .collect::<Result<Vec<_>>>()?;

        // INVARIANT: Requested root always comes first, whatever the sort.
        if let Some(root) = root {
            if let Some(index) = datasets.iter().position(|dataset| dataset.name == root) {
                let dataset = datasets.remove(index);
                datasets.insert(0, dataset);
            }
        }

        debug!("listed {} datasets", datasets.len());
        Ok(datasets)
    }

    #[instrument(skip(self), level = "debug")]
    fn find_local_property(&self, key: &str) -> Result<Vec<(String, String)>> {
        let output = self.zfs([
            "get", "-H", "-p", "-s", "local", "-t", "filesystem", "-o", "name,value", key,
        ])?;

        output
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.split_once('\t')
                    .map(|(name, value)| (name.to_owned(), value.to_owned()))
                    .ok_or_else(|| Error::Parse {
                        line: line.to_owned(),
                    })
            })
            .collect()
    }

    fn exists(&self, name: &str) -> Result<bool> {
        match self.zfs(["list", "-H", "-o", "name", name]) {
            Ok(_) => Ok(true),
            Err(Error::Command { message, .. }) if message.contains("does not exist") => Ok(false),
            Err(error) => Err(error),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn create(
        &self,
        name: &str,
        mountpoint: Option<&Path>,
        properties: &[(&str, &str)],
    ) -> Result<()> {
        let mut args: Vec<OsString> = vec!["create".into()];
        if let Some(mountpoint) = mountpoint {
            let mut option = OsString::from(format!("{MOUNTPOINT}="));
            option.push(mountpoint);
            args.extend(["-o".into(), option]);
        }
        for (key, value) in properties {
            args.extend(["-o".into(), format!("{key}={value}").into()]);
        }
        args.push(name.into());

        self.zfs(args).map(drop)
    }

    fn snapshot(&self, dataset: &str, snapshot: &str) -> Result<String> {
        let name = format!("{dataset}@{snapshot}");
        self.zfs(["snapshot", name.as_str()])?;
        Ok(name)
    }

    fn clone_snapshot(&self, snapshot: &str, name: &str) -> Result<()> {
        self.zfs(["clone", snapshot, name]).map(drop)
    }

    fn destroy(&self, name: &str, recursive: bool) -> Result<()> {
        if recursive {
            self.zfs(["destroy", "-r", name]).map(drop)
        } else {
            self.zfs(["destroy", name]).map(drop)
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.zfs(["rename", from, to]).map(drop)
    }

    fn promote(&self, dataset: &str) -> Result<()> {
        self.zfs(["promote", dataset]).map(drop)
    }

    fn set_property(&self, dataset: &str, key: &str, value: &str) -> Result<()> {
        self.zfs(["set", format!("{key}={value}").as_str(), dataset])
            .map(drop)
    }

    fn inherit_property(&self, dataset: &str, key: &str) -> Result<()> {
        self.zfs(["inherit", key, dataset]).map(drop)
    }

    fn mount(&self, dataset: &str) -> Result<()> {
        self.zfs(["mount", dataset]).map(drop)
    }

    fn unmount(&self, dataset: &str) -> Result<()> {
        self.zfs(["unmount", dataset]).map(drop)
    }
}

fn parse_list_line(line: &str, properties: &[&str]) -> Result<DatasetInfo> {
    let parse_error = || Error::Parse {
        line: line.to_owned(),
    };

    let fields = line.split('\t').collect::<Vec<_>>();
    if fields.len() != LIST_COLUMNS.len() + properties.len() {
        return Err(parse_error());
    }

    let mountpoint = match fields[2] {
        "-" | "none" | "legacy" => None,
        path => Some(PathBuf::from(path)),
    };
    let mounted = match fields[3] {
        "yes" => true,
        "no" | "-" => false,
        _ => return Err(parse_error()),
    };

    Ok(DatasetInfo {
        name: fields[0].to_owned(),
        origin: dash_to_none(fields[1]).map(str::to_owned),
        mountpoint,
        mounted,
        created_at: fields[4].parse().map_err(|_| parse_error())?,
        used_bytes: fields[5].parse().map_err(|_| parse_error())?,
        properties: properties
            .iter()
            .zip(&fields[LIST_COLUMNS.len()..])
            .filter_map(|(key, value)| {
                dash_to_none(value).map(|value| ((*key).to_owned(), value.to_owned()))
            })
            .collect(),
    })
}

fn dash_to_none(field: &str) -> Option<&str> {
    match field {
        "-" | "" => None,
        value => Some(value),
    }
}

#[instrument(skip(args), level = "debug")]
fn syscall_non_interactive(
    cmd: impl AsRef<OsStr> + std::fmt::Debug,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<_>>();
    let command = std::iter::once(cmd.as_ref())
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ");
    debug!("run {command}");

    let output = Command::new(cmd.as_ref())
        .args(&args)
        .output()
        .map_err(|source| Error::Spawn {
            source,
            command: command.clone(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

    if !output.status.success() {
        // INVARIANT: Chomp trailing newlines.
        let message = stderr.trim_end().to_owned();
        return Err(Error::Command { command, message });
    }

    Ok(stdout)
}
