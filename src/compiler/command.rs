//! Compiler, postprocess and dependency-install invocations.

use std::path::{Path, PathBuf};

use crate::cache::CACHE_DIR;
use crate::core::{CompilationMode, CompileKind, RunMode};

use super::process::Cmd;

/// Where typecheck-only output goes.
pub const NULL_OUTPUT: &str = if cfg!(windows) { "NUL" } else { "/dev/null" };

pub const DUMMY_MODULE: &str = "ElmWatchDummy";

/// `elm make --report=json [--debug|--optimize] --output=<out> <inputs..>`,
/// run in the `elm.json` directory.
pub fn elm_make(
    compiler: &Path,
    cwd: &Path,
    inputs: &[PathBuf],
    output: &Path,
    mode: CompilationMode,
    kind: CompileKind,
) -> Cmd {
    let output = match kind {
        CompileKind::TypecheckOnly => PathBuf::from(NULL_OUTPUT),
        CompileKind::FullCompile => output.to_path_buf(),
    };

    let mut cmd = Cmd::new(compiler).args(["make", "--report=json"]);
    if let Some(flag) = mode.flag() {
        cmd = cmd.arg(flag);
    }
    let mut output_arg = std::ffi::OsString::from("--output=");
    output_arg.push(output.as_os_str());
    cmd.arg(output_arg).args(inputs).cwd(cwd)
}

/// Postprocess: compiled code on stdin, final code on stdout.
///
/// Arguments appended to the configured argv: target name, compilation
/// mode, run mode.
pub fn postprocess(
    argv: &[String],
    cwd: &Path,
    target: &str,
    mode: CompilationMode,
    run_mode: RunMode,
    code: String,
) -> Cmd {
    Cmd::from_slice(argv)
        .args([target, mode.label(), run_mode.label()])
        .cwd(cwd)
        .env("ELM_WATCH_TARGET", target)
        .env("ELM_WATCH_MODE", mode.label())
        .stdin(code)
}

/// Path of the dummy module compiled to install a group's dependencies.
pub fn dummy_module_path(elm_json_dir: &Path) -> PathBuf {
    elm_json_dir
        .join(CACHE_DIR)
        .join(format!("{DUMMY_MODULE}.elm"))
}

/// Write the dummy module and build the command that compiles it.
///
/// Compiling any module makes the compiler resolve and download every
/// dependency in `elm.json`.
pub fn install(compiler: &Path, elm_json_dir: &Path) -> std::io::Result<Cmd> {
    let module = dummy_module_path(elm_json_dir);
    if let Some(parent) = module.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        &module,
        format!("module {DUMMY_MODULE} exposing (dummy)\n\n\ndummy : ()\ndummy =\n    ()\n"),
    )?;

    let mut output_arg = std::ffi::OsString::from("--output=");
    output_arg.push(NULL_OUTPUT);
    Ok(Cmd::new(compiler)
        .args(["make", "--report=json"])
        .arg(output_arg)
        .arg(&module)
        .cwd(elm_json_dir))
}
