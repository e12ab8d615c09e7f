use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("cobslink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: cobslink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("COBSLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: serial={}, async={}, cli=true",
        cfg!(feature = "serial"),
        cfg!(feature = "async")
    );
    println!(
        "defaults: max_payload={} intake={}/{}/{}",
        cobslink_frame::DEFAULT_MAX_PAYLOAD,
        cobslink_frame::intake::DEFAULT_CAPACITY,
        cobslink_frame::intake::DEFAULT_HIGH_WATERMARK,
        cobslink_frame::intake::DEFAULT_LOW_WATERMARK
    );

    Ok(SUCCESS)
}
