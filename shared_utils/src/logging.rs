//! Logging Module - 统一的日志系统
//!
//! 基于tracing框架的统一日志系统：
//! - 日志同时输出到日志文件（无颜色）和stderr（带颜色）
//! - `RUST_LOG` 可覆盖默认级别
//! - 外部工具调用（ffmpeg、magick、exiftool、avifenc）的详细日志
//!
//! # Examples
//!
//! ```no_run
//! use shared_utils::logging::{LogConfig, init_logging};
//! use tracing::info;
//!
//! let config = LogConfig::default().with_log_file("conversion.log");
//! init_logging("convert", config).expect("Failed to initialize logging");
//! info!("Program started");
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志文件路径（默认为当前目录下的 conversion.log）
    pub log_file: PathBuf,
    /// 日志级别，默认Info
    pub level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(crate::config::DEFAULT_LOG_FILE),
            level: Level::INFO,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置日志文件
    pub fn with_log_file<P: AsRef<Path>>(mut self, file: P) -> Self {
        self.log_file = file.as_ref().to_path_buf();
        self
    }

    /// 设置日志级别
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Directory and file name the appender writes to.
    fn split_path(&self) -> (PathBuf, String) {
        let dir = self
            .log_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = self
            .log_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| crate::config::DEFAULT_LOG_FILE.to_string());
        (dir, name)
    }
}

/// 初始化日志系统
///
/// 只能调用一次（全局subscriber）。文件层不带ANSI颜色，stderr层带颜色。
pub fn init_logging(program_name: &str, config: LogConfig) -> Result<()> {
    let (log_dir, log_file_name) = config.split_path();

    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    // 单个日志文件，追加写入，不轮转
    let file_appender = tracing_appender::rolling::never(&log_dir, &log_file_name);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Logging system already initialized")?;

    tracing::debug!(
        program = program_name,
        log_file = ?config.log_file,
        level = ?config.level,
        "Logging system initialized"
    );

    Ok(())
}

/// 记录外部工具调用
pub fn log_external_tool(
    tool_name: &str,
    args: &[String],
    stderr: &str,
    exit_code: Option<i32>,
    duration: Duration,
) {
    let command = format!("{} {}", tool_name, args.join(" "));

    match exit_code {
        Some(0) => {
            tracing::debug!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                "External tool completed successfully"
            );
        }
        Some(code) => {
            tracing::warn!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                exit_code = code,
                stderr = %stderr.trim(),
                "External tool failed"
            );
        }
        None => {
            tracing::warn!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                stderr = %stderr.trim(),
                "External tool terminated without exit code"
            );
        }
    }
}

/// 外部命令执行结果
#[derive(Debug)]
pub struct ExternalCommandResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// 执行外部命令并记录详细日志
///
/// 只有进程无法启动时才返回错误；非零退出码体现在 `exit_code` 中。
pub fn execute_external_command(tool_name: &str, args: &[String]) -> Result<ExternalCommandResult> {
    use std::process::Command;

    let command_str = format!("{} {}", tool_name, args.join(" "));
    tracing::debug!(tool = tool_name, command = %command_str, "Executing external command");

    let start_time = Instant::now();
    let output = Command::new(tool_name)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute command: {}", command_str))?;
    let duration = start_time.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code();

    log_external_tool(tool_name, args, &stderr, exit_code, duration);

    Ok(ExternalCommandResult {
        exit_code,
        stdout,
        stderr,
        duration,
    })
}
