use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Install DChess as a self-contained native bundle")]
pub struct Args {
    /// Directory to install into; created if missing, left holding only the bundle
    pub install_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_positional() {
        let args = Args::try_parse_from(["dchess-install", "/opt/dchess"]).unwrap();
        assert_eq!(args.install_dir, PathBuf::from("/opt/dchess"));
    }

    #[test]
    fn test_missing_or_extra_arguments() {
        assert!(Args::try_parse_from(["dchess-install"]).is_err());
        assert!(Args::try_parse_from(["dchess-install", "a", "b"]).is_err());
    }
}
