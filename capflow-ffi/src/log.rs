use log::Level;

/// Initializes logging to stdout.
///
/// `level_num` ranges from 0 (errors only) to 4 (trace), larger values enable trace output.
/// Calling this more than once has no effect.
#[no_mangle]
pub extern "C" fn log_init(level_num: i32) {
    let level = match level_num {
        0 => Level::Error,
        1 => Level::Warn,
        2 => Level::Info,
        3 => Level::Debug,
        _ => Level::Trace,
    };

    simple_logger::SimpleLogger::new()
        .with_level(level.to_level_filter())
        .init()
        .ok();
}
