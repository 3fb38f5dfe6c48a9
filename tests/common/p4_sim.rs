//! In-memory Perforce server speaking enough of the `p4 -z tag` protocol
//! for the client and transaction tests.
//!
//! The simulator owns a temporary workspace root. Working files are real
//! files under that root; the depot, changelists and opened files live in
//! memory. Every invocation is recorded so tests can count them.

use nimp::p4::{P4Config, P4};
use nimp::process::{split_lines, CaptureOutput, Invocation, LineSink, ProcessRunner, StreamOrigin};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const CLIENT: &str = "test_client";
pub const USER: &str = "test_user";
pub const FIRST_CHANGE: u32 = 400;

#[derive(Debug, Clone)]
struct DepotFile {
    head_action: String,
    content: Vec<u8>,
    rev: u32,
}

#[derive(Debug, Clone)]
struct Change {
    description: String,
    submitted: bool,
    files: BTreeMap<PathBuf, String>,
}

#[derive(Debug, Default)]
struct State {
    next_change: u32,
    changes: BTreeMap<u32, Change>,
    depot: BTreeMap<PathBuf, DepotFile>,
    invocations: Vec<Vec<String>>,
    stdin: Vec<Option<String>>,
    injected: VecDeque<CaptureOutput>,
}

/// File specification as sent by the client.
enum Spec {
    All,
    Dir(PathBuf),
    File(PathBuf),
}

impl Spec {
    fn parse(raw: &str) -> Self {
        let raw = raw.split(['#', '@']).next().unwrap_or(raw);
        let raw = nimp::p4::parse::unescape_filename(raw);
        if raw == "//..." {
            Spec::All
        } else if let Some(dir) = raw.strip_suffix("/...") {
            Spec::Dir(PathBuf::from(dir))
        } else {
            Spec::File(PathBuf::from(raw))
        }
    }

    fn matches(&self, path: &Path) -> bool {
        match self {
            Spec::All => true,
            Spec::Dir(dir) => path.starts_with(dir),
            Spec::File(file) => path == file,
        }
    }
}

pub struct P4Simulator {
    root: PathBuf,
    _dir: tempfile::TempDir,
    state: Mutex<State>,
}

impl P4Simulator {
    pub fn new() -> Arc<Self> {
        let dir = tempfile::TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        Arc::new(Self {
            root,
            _dir: dir,
            state: Mutex::new(State {
                next_change: FIRST_CHANGE,
                ..Default::default()
            }),
        })
    }

    /// Client bound to this simulator as `test_user@test_client`.
    pub fn client(self: &Arc<Self>) -> P4 {
        let config = P4Config {
            user: Some(USER.to_string()),
            client: Some(CLIENT.to_string()),
            ..Default::default()
        };
        P4::with_runner(config, self.clone()).with_cwd(&self.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Puts `name` at head revision 1 with `content`, synced to disk.
    pub fn submit_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.write(name, content);
        let mut state = self.state.lock().unwrap();
        let id = state.next_change;
        state.next_change += 1;
        state.changes.insert(
            id,
            Change {
                description: format!("seed {}", name),
                submitted: true,
                files: BTreeMap::from([(path.clone(), "add".to_string())]),
            },
        );
        state.depot.insert(
            path.clone(),
            DepotFile {
                head_action: "add".to_string(),
                content: content.as_bytes().to_vec(),
                rev: 1,
            },
        );
        path
    }

    /// Number of pending changelists of the workspace.
    pub fn pending_changelists(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .changes
            .values()
            .filter(|c| !c.submitted)
            .count()
    }

    pub fn head_content(&self, path: &Path) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .depot
            .get(path)
            .map(|f| String::from_utf8_lossy(&f.content).into_owned())
    }

    pub fn invocation_count(&self) -> usize {
        self.state.lock().unwrap().invocations.len()
    }

    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().invocations.clone()
    }

    /// Stdin fed to the most recent invocation.
    pub fn last_stdin(&self) -> Option<String> {
        self.state.lock().unwrap().stdin.last().cloned().flatten()
    }

    /// The next call returns `output` instead of reaching the server.
    pub fn inject(&self, output: CaptureOutput) {
        self.state.lock().unwrap().injected.push_back(output);
    }

    fn depot_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        format!("//depot/{}", relative.to_string_lossy().replace('\\', "/"))
    }

    fn disk_files(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    fn execute(&self, state: &mut State, verb: &str, args: &[String]) -> CaptureOutput {
        match verb {
            "info" => CaptureOutput::new(
                0,
                format!(
                    "... userName {}\n... clientName {}\n... clientRoot {}\n",
                    USER,
                    CLIENT,
                    self.root.display()
                ),
                "",
            ),
            "user" => CaptureOutput::new(0, format!("... User {}\n... FullName Test User\n", USER), ""),
            "changes" => self.changes(state, args),
            "describe" => self.describe(state, args),
            "change" => self.change(state, args),
            "add" => self.add(state, args),
            "edit" => self.edit(state, args),
            "delete" => self.delete(state, args),
            "revert" => self.revert(state, args),
            "reconcile" => self.reconcile(state, args),
            "fstat" => self.fstat(state, args),
            "submit" => self.submit(state, args),
            "sync" => CaptureOutput::new(0, "", "//... - file(s) up-to-date.\n"),
            other => CaptureOutput::new(1, "", format!("Unknown command '{}'.\n", other)),
        }
    }

    fn changes(&self, state: &State, args: &[String]) -> CaptureOutput {
        let mut status = None;
        let mut max = usize::MAX;
        let mut specs = Vec::new();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-s" => {
                    status = Some(args[i + 1].clone());
                    i += 1;
                }
                "-m" | "--max" => {
                    max = args[i + 1].parse().unwrap();
                    i += 1;
                }
                "-c" => i += 1,
                "-m1" => max = 1,
                spec => specs.push(Spec::parse(spec)),
            }
            i += 1;
        }
        let stdout: String = state
            .changes
            .iter()
            .rev()
            .filter(|(_, c)| match status.as_deref() {
                Some("pending") => !c.submitted,
                Some("submitted") => c.submitted,
                _ => true,
            })
            .filter(|(_, c)| {
                specs.is_empty() || c.files.keys().any(|f| specs.iter().any(|s| s.matches(f)))
            })
            .take(max)
            .map(|(id, c)| {
                format!(
                    "... change {}\n... status {}\n... desc {}\n\n",
                    id,
                    if c.submitted { "submitted" } else { "pending" },
                    c.description
                )
            })
            .collect();
        CaptureOutput::new(0, stdout, "")
    }

    fn describe(&self, state: &State, args: &[String]) -> CaptureOutput {
        let id: u32 = args.last().and_then(|a| a.parse().ok()).unwrap_or(0);
        match state.changes.get(&id) {
            Some(change) => {
                let mut out = format!(
                    "... change {}\n... user {}\n... client {}\n... status {}\n... desc {}\n",
                    id,
                    USER,
                    CLIENT,
                    if change.submitted { "submitted" } else { "pending" },
                    change.description
                );
                for (index, (path, action)) in change.files.iter().enumerate() {
                    out.push_str(&format!(
                        "... depotFile{} {}\n... action{} {}\n",
                        index,
                        self.depot_path(path),
                        index,
                        action
                    ));
                }
                CaptureOutput::new(0, out, "")
            }
            None => CaptureOutput::new(1, "", format!("Change {} unknown.\n", id)),
        }
    }

    fn change(&self, state: &mut State, args: &[String]) -> CaptureOutput {
        match args.first().map(String::as_str) {
            Some("-i") => {
                let form = args[1..].join("\n");
                let description = form
                    .lines()
                    .skip_while(|l| !l.starts_with("Description:"))
                    .nth(1)
                    .unwrap_or("")
                    .trim()
                    .to_string();
                let id = state.next_change;
                state.next_change += 1;
                state.changes.insert(
                    id,
                    Change {
                        description,
                        submitted: false,
                        files: BTreeMap::new(),
                    },
                );
                CaptureOutput::new(0, format!("Change {} created.\n", id), "")
            }
            Some("-d") => {
                let id: u32 = args[1].parse().unwrap_or(0);
                match state.changes.get(&id) {
                    None => CaptureOutput::new(1, "", format!("Change {} unknown.\n", id)),
                    Some(c) if c.submitted => CaptureOutput::new(
                        1,
                        "",
                        format!("Change {} is already committed.\n", id),
                    ),
                    Some(c) if !c.files.is_empty() => CaptureOutput::new(
                        1,
                        "",
                        format!(
                            "Change {} has {} open file(s) associated with it and can't be deleted.\n",
                            id,
                            c.files.len()
                        ),
                    ),
                    Some(_) => {
                        state.changes.remove(&id);
                        CaptureOutput::new(0, format!("Change {} deleted.\n", id), "")
                    }
                }
            }
            _ => CaptureOutput::new(1, "", "Usage: change -i | change -d N\n"),
        }
    }

    /// Splits `-c N` and other flags from file arguments.
    fn split_args(args: &[String]) -> (Option<u32>, Vec<String>, Vec<String>) {
        let mut change = None;
        let mut flags = Vec::new();
        let mut files = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            let numeric = args.get(i + 1).and_then(|a| a.parse::<u32>().ok());
            if (arg == "-c" || arg == "-e") && numeric.is_some() {
                change = numeric;
                i += 1;
            } else if arg == "-f" && args.get(i + 1).map(String::as_str) == Some("revertunchanged") {
                flags.push("revertunchanged".to_string());
                i += 1;
            } else if arg.starts_with('-') && !arg.starts_with("//") {
                flags.push(arg.clone());
            } else {
                files.push(arg.clone());
            }
            i += 1;
        }
        (change, flags, files)
    }

    fn opened(state: &State) -> Vec<(u32, PathBuf, String)> {
        state
            .changes
            .iter()
            .filter(|(_, c)| !c.submitted)
            .flat_map(|(id, c)| {
                c.files
                    .iter()
                    .map(move |(p, a)| (*id, p.clone(), a.clone()))
            })
            .collect()
    }

    fn open(state: &mut State, change: Option<u32>, path: &Path, action: &str) -> Result<(), String> {
        let id = change.ok_or("no changelist")?;
        match state.changes.get_mut(&id) {
            Some(c) if !c.submitted => {
                c.files.insert(path.to_path_buf(), action.to_string());
                Ok(())
            }
            _ => Err(format!("Change {} unknown.", id)),
        }
    }

    fn is_live(state: &State, path: &Path) -> bool {
        state
            .depot
            .get(path)
            .is_some_and(|f| f.head_action != "delete")
    }

    fn add(&self, state: &mut State, args: &[String]) -> CaptureOutput {
        let (change, _, files) = Self::split_args(args);
        let mut output = CaptureOutput::default();
        for file in files {
            let path = PathBuf::from(nimp::p4::parse::unescape_filename(&file));
            if Self::opened(state).iter().any(|(_, p, _)| *p == path) {
                output.stderr += &format!("{} - currently opened for edit\n", path.display());
            } else if Self::is_live(state, &path) {
                output.stderr += &format!("{} - can't add existing file\n", path.display());
            } else if let Err(e) = Self::open(state, change, &path, "add") {
                return CaptureOutput::new(1, "", e);
            } else {
                output.stdout += &format!("{}#1 - opened for add\n", self.depot_path(&path));
            }
        }
        output
    }

    fn edit(&self, state: &mut State, args: &[String]) -> CaptureOutput {
        let (change, _, files) = Self::split_args(args);
        let mut output = CaptureOutput::default();
        for file in files {
            let path = PathBuf::from(nimp::p4::parse::unescape_filename(&file));
            if !Self::is_live(state, &path) {
                output.stderr += &format!("{} - file(s) not on client.\n", path.display());
            } else if Self::opened(state).iter().any(|(_, p, _)| *p == path) {
                output.stderr += &format!("{} - currently opened for edit\n", path.display());
            } else if let Err(e) = Self::open(state, change, &path, "edit") {
                return CaptureOutput::new(1, "", e);
            } else {
                output.stdout += &format!("{}#1 - opened for edit\n", self.depot_path(&path));
            }
        }
        output
    }

    fn delete(&self, state: &mut State, args: &[String]) -> CaptureOutput {
        let (change, _, files) = Self::split_args(args);
        let mut output = CaptureOutput::default();
        for file in files {
            let path = PathBuf::from(nimp::p4::parse::unescape_filename(&file));
            if !Self::is_live(state, &path) {
                output.stderr += &format!("{} - file(s) not on client.\n", path.display());
            } else if let Err(e) = Self::open(state, change, &path, "delete") {
                return CaptureOutput::new(1, "", e);
            } else {
                let _ = fs::remove_file(&path);
                output.stdout += &format!("{}#1 - opened for delete\n", self.depot_path(&path));
            }
        }
        output
    }

    fn revert(&self, state: &mut State, args: &[String]) -> CaptureOutput {
        let (change, flags, files) = Self::split_args(args);
        let unchanged_only = flags.iter().any(|f| f == "-a");
        let specs: Vec<Spec> = files.iter().map(|f| Spec::parse(f)).collect();

        let targets: Vec<(u32, PathBuf, String)> = Self::opened(state)
            .into_iter()
            .filter(|(id, path, action)| {
                change.is_none_or(|c| c == *id)
                    && specs.iter().any(|s| s.matches(path))
                    && (!unchanged_only
                        || (action == "edit"
                            && fs::read(path).ok().as_deref()
                                == state.depot.get(path).map(|f| f.content.as_slice())))
            })
            .collect();

        if targets.is_empty() {
            return CaptureOutput::new(0, "", format!("{} - file(s) not opened on this client.\n", files.join(" ")));
        }

        let mut stdout = String::new();
        for (id, path, action) in targets {
            if let Some(c) = state.changes.get_mut(&id) {
                c.files.remove(&path);
            }
            if action == "edit" || action == "delete" {
                if let Some(head) = state.depot.get(&path) {
                    fs::write(&path, &head.content).unwrap();
                }
            }
            stdout += &format!("{} - was {}, reverted\n", self.depot_path(&path), action);
        }
        CaptureOutput::new(0, stdout, "")
    }

    fn reconcile(&self, state: &mut State, args: &[String]) -> CaptureOutput {
        let (change, flags, files) = Self::split_args(args);
        let preview = flags.iter().any(|f| f == "-n");
        let specs: Vec<Spec> = files.iter().map(|f| Spec::parse(f)).collect();
        let opened: Vec<PathBuf> = Self::opened(state).into_iter().map(|(_, p, _)| p).collect();

        let mut candidates: Vec<PathBuf> = self.disk_files();
        candidates.extend(state.depot.keys().cloned());
        candidates.sort();
        candidates.dedup();

        let mut stdout = String::new();
        for path in candidates {
            if !specs.iter().any(|s| s.matches(&path)) || opened.contains(&path) {
                continue;
            }
            let on_disk = fs::read(&path).ok();
            let head = state.depot.get(&path).filter(|f| f.head_action != "delete");
            let action = match (on_disk, head) {
                (Some(_), None) => "add",
                (None, Some(_)) => "delete",
                (Some(content), Some(head)) if content != head.content => "edit",
                _ => continue,
            };
            if !preview {
                if let Err(e) = Self::open(state, change, &path, action) {
                    return CaptureOutput::new(1, "", e);
                }
            }
            stdout += &format!("{} - opened for {}\n", self.depot_path(&path), action);
        }
        if stdout.is_empty() {
            return CaptureOutput::new(0, "", format!("{} - no file(s) to reconcile.\n", files.join(" ")));
        }
        CaptureOutput::new(0, stdout, "")
    }

    fn fstat(&self, state: &State, args: &[String]) -> CaptureOutput {
        let (change, _, files) = Self::split_args(args);

        if let Some(id) = change {
            let spec = Spec::parse(files.first().map(String::as_str).unwrap_or("//..."));
            let stdout: String = state
                .changes
                .get(&id)
                .map(|c| {
                    c.files
                        .iter()
                        .filter(|(p, _)| spec.matches(p))
                        .map(|(p, a)| format!("... depotFile {}\n... headAction {}\n\n", self.depot_path(p), a))
                        .collect()
                })
                .unwrap_or_default();
            return CaptureOutput::new(0, stdout, "");
        }

        let opened = Self::opened(state);
        let mut stdout = String::new();
        let mut stderr = String::new();
        for file in &files {
            let spec = Spec::parse(file);
            let mut paths: Vec<PathBuf> = state
                .depot
                .keys()
                .cloned()
                .chain(opened.iter().map(|(_, p, _)| p.clone()))
                .filter(|p| spec.matches(p))
                .collect();
            paths.sort();
            paths.dedup();
            if paths.is_empty() {
                stderr += &format!("{} - no such file(s).\n\n", file);
            }
            for path in paths {
                stdout += &format!(
                    "... depotFile {}\n... clientFile {}\n",
                    self.depot_path(&path),
                    path.display()
                );
                if let Some(head) = state.depot.get(&path) {
                    stdout += &format!("... headAction {}\n... headRev {}\n", head.head_action, head.rev);
                }
                if let Some((id, _, action)) = opened.iter().find(|(_, p, _)| *p == path) {
                    stdout += &format!("... action {}\n... change {}\n", action, id);
                }
                stdout.push('\n');
            }
        }
        CaptureOutput::new(0, stdout, stderr)
    }

    fn submit(&self, state: &mut State, args: &[String]) -> CaptureOutput {
        let (change, flags, _) = Self::split_args(args);
        let Some(id) = change else {
            return CaptureOutput::new(1, "", "Default changelist submission is not simulated.\n");
        };
        let Some(c) = state.changes.get(&id).cloned() else {
            return CaptureOutput::new(1, "", format!("Change {} unknown.\n", id));
        };

        let mut files = c.files.clone();
        if flags.iter().any(|f| f == "revertunchanged") {
            files.retain(|path, action| {
                action != "edit"
                    || fs::read(path).ok().as_deref() != state.depot.get(path).map(|f| f.content.as_slice())
            });
        }
        if files.is_empty() {
            if let Some(c) = state.changes.get_mut(&id) {
                c.files.clear();
            }
            return CaptureOutput::new(1, "", "No files to submit.\n");
        }

        for (path, action) in &files {
            let content = fs::read(path).unwrap_or_default();
            let rev = state.depot.get(path).map(|f| f.rev + 1).unwrap_or(1);
            state.depot.insert(
                path.clone(),
                DepotFile {
                    head_action: action.clone(),
                    content,
                    rev,
                },
            );
        }
        if let Some(c) = state.changes.get_mut(&id) {
            c.files = files;
            c.submitted = true;
        }
        CaptureOutput::new(0, format!("Change {} submitted.\n", id), "")
    }
}

impl ProcessRunner for P4Simulator {
    fn capture(&self, invocation: &Invocation) -> nimp::error::Result<CaptureOutput> {
        let mut state = self.state.lock().unwrap();
        let argv = invocation.arguments().to_vec();
        state.invocations.push(argv.clone());
        state.stdin.push(invocation.stdin_data().map(str::to_string));
        if let Some(output) = state.injected.pop_front() {
            return Ok(output);
        }

        let mut i = 0;
        let mut stdin_args = false;
        while i < argv.len() {
            match argv[i].as_str() {
                "-z" | "-p" | "-u" | "-P" | "-c" => i += 2,
                "-x" => {
                    stdin_args = argv.get(i + 1).map(String::as_str) == Some("-");
                    i += 2;
                }
                _ => break,
            }
        }
        let Some(verb) = argv.get(i) else {
            return Ok(CaptureOutput::new(1, "", "Missing command.\n"));
        };
        let mut args: Vec<String> = argv[i + 1..].to_vec();
        if let Some(stdin) = invocation.stdin_data() {
            if stdin_args || verb == "change" {
                args.extend(split_lines(stdin).filter(|l| !l.is_empty() || verb == "change").map(str::to_string));
            }
        }
        Ok(self.execute(&mut state, verb, &args))
    }

    fn stream(&self, invocation: &Invocation, sink: &dyn LineSink) -> nimp::error::Result<i32> {
        let output = self.capture(invocation)?;
        for line in split_lines(&output.stdout) {
            sink.line(StreamOrigin::Stdout, line);
        }
        for line in split_lines(&output.stderr) {
            sink.line(StreamOrigin::Stderr, line);
        }
        Ok(output.exit_code)
    }
}
