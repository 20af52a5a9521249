use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chunkport_cli::convert::{ConvertOptions, convert_world};
use chunkport_cli::mapping::BlockMapping;

fn arg_value(flag: &str) -> Option<String> {
    std::env::args().skip_while(|a| a != flag).nth(1)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let (Some(input), Some(output)) = (arg_value("--in"), arg_value("--out")) else {
        eprintln!(
            "usage: chunkport --in <world> --out <dir> \
             [--mapping <file.json>] [--data-version <n>] [--no-pretransform]"
        );
        return ExitCode::from(2);
    };

    let mapping = match arg_value("--mapping") {
        Some(path) => match BlockMapping::from_file(Path::new(&path)) {
            Ok(mapping) => mapping,
            Err(e) => {
                tracing::error!("{:#}", e);
                return ExitCode::FAILURE;
            }
        },
        None => BlockMapping::identity(),
    };
    let data_version = arg_value("--data-version").and_then(|s| s.parse().ok());
    let pre_transform = !std::env::args().any(|a| a == "--no-pretransform");

    let options = ConvertOptions {
        input: PathBuf::from(input),
        output: PathBuf::from(output),
        mapping,
        data_version,
        pre_transform,
    };

    match convert_world(&options) {
        Ok(stats) if stats.write_errors == 0 => {
            if stats.stranded_entities > 0 {
                tracing::warn!(
                    "{} entities could not be relocated and stayed in place",
                    stats.stranded_entities
                );
            }
            ExitCode::SUCCESS
        }
        Ok(stats) => {
            tracing::error!("{} chunks failed to write", stats.write_errors);
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("conversion failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
