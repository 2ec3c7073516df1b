use clap::Parser;
use rild::{CliRequest, RildError};
use std::path::PathBuf;

pub(crate) const SEPARATOR: &str = "--";
const LIB_FLAG: &str = "-l";

#[derive(Parser, Debug)]
#[command(name = "rild")]
#[command(about = "Radio interface bootstrap daemon", long_about = None)]
#[command(args_override_self = true)]
pub(crate) struct Cli {
    /// Vendor RIL implementation library to load
    #[arg(short = 'l', value_name = "ril impl library", allow_hyphen_values = true)]
    pub lib: Option<PathBuf>,
}

/// Parse the daemon's own flags. Everything after the first `--` belongs to
/// the vendor module and is never seen by clap.
pub(crate) fn parse<I>(args: I) -> rild::Result<CliRequest>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let argv0 = args.next().unwrap_or_else(|| "rild".to_string());
    let rest: Vec<String> = args.collect();

    let (own, module_args) = match rest.iter().position(|a| a == SEPARATOR) {
        Some(idx) => (rest[..idx].to_vec(), Some(rest[idx + 1..].to_vec())),
        None => (rest, None),
    };

    reject_attached_values(&own)?;

    let cli = Cli::try_parse_from(std::iter::once(argv0).chain(own))
        .map_err(|e| RildError::Usage(e.to_string()))?;

    Ok(CliRequest {
        module_path: cli.lib,
        module_args,
    })
}

/// `-l` takes its value as the next argument only; `-lPATH` and `-l=PATH`
/// are usage errors.
fn reject_attached_values(own: &[String]) -> rild::Result<()> {
    let mut args = own.iter();
    while let Some(arg) = args.next() {
        if arg == LIB_FLAG {
            args.next();
        } else if arg.starts_with(LIB_FLAG) {
            return Err(RildError::Usage(format!("unexpected argument '{}'", arg)));
        }
    }
    Ok(())
}

pub(crate) fn usage(argv0: &str) -> String {
    format!(
        "Usage: {} -l <ril impl library> [-- <args for impl library>]",
        argv0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_strs(args: &[&str]) -> rild::Result<CliRequest> {
        parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_bare_run() {
        assert_eq!(parse_strs(&["rild"]).unwrap(), CliRequest::default());
    }

    #[test]
    fn test_lib_with_module_args() {
        let req = parse_strs(&["rild", "-l", "/system/lib/libril-vendor.so", "--", "-d", "/dev/smd0"])
            .unwrap();
        assert_eq!(req.module_path, Some(PathBuf::from("/system/lib/libril-vendor.so")));
        assert_eq!(
            req.module_args,
            Some(vec!["-d".to_string(), "/dev/smd0".to_string()])
        );
    }

    #[test]
    fn test_separator_without_args() {
        let req = parse_strs(&["rild", "-l", "/system/lib/libril-vendor.so", "--"]).unwrap();
        assert_eq!(req.module_args, Some(Vec::new()));
    }

    #[test]
    fn test_module_args_may_look_like_flags() {
        let req = parse_strs(&["rild", "--", "-l", "--", "-x"]).unwrap();
        assert_eq!(req.module_path, None);
        assert_eq!(
            req.module_args,
            Some(vec!["-l".to_string(), "--".to_string(), "-x".to_string()])
        );
    }

    #[test]
    fn test_last_lib_wins() {
        let req = parse_strs(&["rild", "-l", "/a.so", "-l", "/b.so"]).unwrap();
        assert_eq!(req.module_path, Some(PathBuf::from("/b.so")));
    }

    #[test]
    fn test_lib_path_may_start_with_hyphen() {
        let req = parse_strs(&["rild", "-l", "-vendor.so"]).unwrap();
        assert_eq!(req.module_path, Some(PathBuf::from("-vendor.so")));

        let req = parse_strs(&["rild", "-l", "-lfoo.so"]).unwrap();
        assert_eq!(req.module_path, Some(PathBuf::from("-lfoo.so")));
    }

    #[test]
    fn test_attached_lib_value_rejected() {
        assert!(matches!(parse_strs(&["rild", "-l/a.so"]), Err(RildError::Usage(_))));
        assert!(matches!(parse_strs(&["rild", "-l=/a.so"]), Err(RildError::Usage(_))));
        assert!(matches!(
            parse_strs(&["rild", "-l", "/a.so", "-l/b.so"]),
            Err(RildError::Usage(_))
        ));
    }

    #[test]
    fn test_malformed_arguments() {
        assert!(matches!(parse_strs(&["rild", "-l"]), Err(RildError::Usage(_))));
        assert!(parse_strs(&["rild", "-x"]).is_err());
        assert!(parse_strs(&["rild", "stray"]).is_err());
        assert!(parse_strs(&["rild", "-l", "/a.so", "extra"]).is_err());
    }

    #[test]
    fn test_usage_line() {
        assert_eq!(
            usage("/system/bin/rild"),
            "Usage: /system/bin/rild -l <ril impl library> [-- <args for impl library>]"
        );
    }
}
