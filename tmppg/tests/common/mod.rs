#![allow(dead_code)]

//! Fake `initdb`/`postgres`/`pg_isready` tools.
//!
//! The scripts are written once per test binary. Every [`FakePostgres`]
//! gets its own bin dir holding symlinks to them, plus plain files that
//! steer their behavior and collect an event log, so tests can run in
//! parallel without sharing state.

use std::{
    fs,
    os::unix::fs::{PermissionsExt, symlink},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use tempfile::{TempDir, tempdir};
use tmppg::Config;

const INITDB: &str = r#"#!/bin/sh
here=$(dirname "$0")
echo "$*" > "$here/initdb.args"
echo "initdb $2" >> "$here/events"
code=$(cat "$here/initdb.exit" 2>/dev/null || echo 0)
if [ "$code" -eq 0 ]; then
    touch "$2/PG_VERSION"
    echo "Success. The files belonging to this database system are ready."
fi
exit "$code"
"#;

const POSTGRES: &str = r#"#!/bin/sh
here=$(dirname "$0")
dir="$2"
echo "$*" > "$here/postgres.args"
echo "postgres started" >> "$here/events"
echo "LOG:  database system is starting up" >&2
if [ -f "$here/postgres.exit" ]; then
    if [ -f "$here/postgres.orphan" ]; then
        sleep "$(cat "$here/postgres.orphan")" &
    fi
    echo "postgres exiting" >> "$here/events"
    exit "$(cat "$here/postgres.exit")"
fi
trap 'if [ -d "$dir" ]; then state=present; else state=missing; fi; echo "postgres terminated dir-$state" >> "$here/events"; exit 0' TERM
while :; do
    sleep 0.05
done
"#;

const PG_ISREADY: &str = r#"#!/bin/sh
here=$(dirname "$0")
n=$(( $(cat "$here/probes" 2>/dev/null || echo 0) + 1 ))
echo "$n" > "$here/probes"
echo "$*" > "$here/pg_isready.args"
echo "pg_isready $n" >> "$here/events"
codes=$(cat "$here/pg_isready.codes" 2>/dev/null || echo 0)
code=0
i=0
for c in $codes; do
    code=$c
    i=$((i + 1))
    [ "$i" -ge "$n" ] && break
done
exit "$code"
"#;

const TOOLS: [(&str, &str); 3] = [
    ("initdb", INITDB),
    ("postgres", POSTGRES),
    ("pg_isready", PG_ISREADY),
];

static SCRIPTS: LazyLock<TempDir> = LazyLock::new(|| {
    let dir = tempdir().expect("scripts tempdir");
    for (name, body) in TOOLS {
        let path = dir.path().join(name);
        fs::write(&path, body).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("chmod script");
    }
    dir
});

pub struct FakePostgres {
    bin: TempDir,
    root: TempDir,
}

impl FakePostgres {
    pub fn new() -> Self {
        let scripts = SCRIPTS.path();
        let bin = tempdir().expect("bin tempdir");
        for (name, _) in TOOLS {
            symlink(scripts.join(name), bin.path().join(name))
                .expect("symlink tool");
        }
        let root = tempdir().expect("root tempdir");
        Self { bin, root }
    }

    /// Fake toolchain without any binaries.
    pub fn empty() -> Self {
        // Scripts must be fully written before any test spawns a process.
        LazyLock::force(&SCRIPTS);
        Self {
            bin: tempdir().expect("bin tempdir"),
            root: tempdir().expect("root tempdir"),
        }
    }

    pub fn initdb_exits_with(self, code: i32) -> Self {
        self.write("initdb.exit", &code.to_string());
        self
    }

    /// Makes `postgres` exit right after starting.
    pub fn postgres_exits_with(self, code: i32) -> Self {
        self.write("postgres.exit", &code.to_string());
        self
    }

    /// Makes the exiting `postgres` leave a child behind for `secs` seconds
    /// that still holds its stdout and stderr.
    pub fn postgres_leaves_orphan(self, secs: u32) -> Self {
        self.write("postgres.orphan", &secs.to_string());
        self
    }

    /// Exit codes for successive probes; the last one repeats.
    pub fn probe_codes(self, codes: &[i32]) -> Self {
        let codes: Vec<String> = codes.iter().map(i32::to_string).collect();
        self.write("pg_isready.codes", &codes.join(" "));
        self
    }

    pub fn bin_dir(&self) -> &Path {
        self.bin.path()
    }

    pub fn temp_root(&self) -> &Path {
        self.root.path()
    }

    pub fn config(&self) -> Config {
        Config::default()
            .with_bin_dir(self.bin_dir())
            .with_temp_root(self.temp_root())
    }

    pub fn events_path(&self) -> PathBuf {
        self.bin.path().join("events")
    }

    pub fn events(&self) -> Vec<String> {
        fs::read_to_string(self.events_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn probe_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| event.starts_with("pg_isready "))
            .count()
    }

    /// Probes that ran after `postgres` announced its exit.
    pub fn probes_after_exit(&self) -> usize {
        self.events()
            .iter()
            .skip_while(|event| *event != "postgres exiting")
            .filter(|event| event.starts_with("pg_isready "))
            .count()
    }

    pub fn server_started(&self) -> bool {
        self.events().iter().any(|event| event == "postgres started")
    }

    /// Scratch directory as seen by `initdb`.
    pub fn scratch_dir(&self) -> PathBuf {
        self.events()
            .iter()
            .find_map(|event| event.strip_prefix("initdb "))
            .map(PathBuf::from)
            .expect("initdb was not run")
    }

    /// Number of entries left under the temp root.
    pub fn leftovers(&self) -> usize {
        fs::read_dir(self.temp_root()).expect("read temp root").count()
    }

    pub fn args(&self, tool: &str) -> String {
        fs::read_to_string(self.bin.path().join(format!("{tool}.args")))
            .unwrap_or_default()
            .trim_end()
            .to_string()
    }

    fn write(&self, name: &str, contents: &str) {
        fs::write(self.bin.path().join(name), contents)
            .expect("write control file");
    }
}
