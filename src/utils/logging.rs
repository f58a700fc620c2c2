// 日志工具模块
//
// 封装 flexi_logger 的初始化和关闭，异步写入模式下退出前必须 flush

use crate::config::LogConfig;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use parking_lot::Mutex;

/// 全局日志句柄，用于程序退出时 flush
static LOGGER_HANDLE: Mutex<Option<LoggerHandle>> = Mutex::new(None);

/// 初始化日志系统
///
/// 日志写入 `<dir>/<file>*.log`，按大小轮转并保留 `max_files` 个文件；
/// 警告及以上级别同时输出到 stderr。进程内只能初始化一次
///
/// # Examples
/// ```no_run
/// use sqlexec::config::Config;
/// use sqlexec::utils::logging;
///
/// let config = Config::default();
/// logging::init(&config.log).expect("日志初始化失败");
/// logging::shutdown();
/// ```
pub fn init(config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let handle = Logger::try_with_str(&config.level)?
        .log_to_file(
            FileSpec::default()
                .basename(&config.file)
                .directory(&config.dir),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .rotate(
            Criterion::Size(config.max_file_size),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.max_files),
        )
        .write_mode(WriteMode::Async)
        .append()
        .start()?;

    *LOGGER_HANDLE.lock() = Some(handle);

    log::info!("Logger initialized: {}/{}", config.dir, config.file);
    Ok(())
}

/// 刷新并关闭日志系统
///
/// 阻塞直到异步日志线程写完当前缓冲
pub fn shutdown() {
    if let Some(handle) = LOGGER_HANDLE.lock().take() {
        handle.flush();
    }
}

pub fn is_initialized() -> bool {
    LOGGER_HANDLE.lock().is_some()
}
