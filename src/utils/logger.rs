use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

const DEFAULT_FILTER: &str = "warn,mediadubs=info";
const VERBOSE_FILTER: &str = "warn,mediadubs=debug";

pub fn init_logger(verbose: bool) {
    // RUST_LOG переопределяет фильтр по умолчанию
    let env = Env::default().filter_or(
        "RUST_LOG",
        if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER },
    );

    let mut builder = Builder::from_env(env);

    builder
        .filter_module("tokio_util", LevelFilter::Error)
        .filter_module("mio", LevelFilter::Error)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        // stdout остаётся для пути к результату
        .target(env_logger::Target::Stderr)
        .init();
}
