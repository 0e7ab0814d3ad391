use super::*;

#[test]
fn parse_show_with_metadata() {
	let cli = Cli::try_parse_from(["hexweave", "game.gba", "-m", "game.toml", "show", "names"]).unwrap();
	assert_eq!(cli.rom, PathBuf::from("game.gba"));
	assert_eq!(cli.metadata, Some(PathBuf::from("game.toml")));
	assert_eq!(cli.command, Command::Show { name: "names".into() });
	assert!(!cli.verbose);
}

#[test]
fn parse_append_requires_output() {
	assert!(Cli::try_parse_from(["hexweave", "game.gba", "append", "moves", "3"]).is_err());
	let cli = Cli::try_parse_from(["hexweave", "game.gba", "-v", "append", "moves", "3", "-o", "out.gba"]).unwrap();
	assert_eq!(
		cli.command,
		Command::Append {
			name: "moves".into(),
			count: 3,
			output: PathBuf::from("out.gba"),
		}
	);
	assert!(cli.verbose);
}

#[test]
fn explicit_metadata_wins() {
	let cli = Cli::try_parse_from(["hexweave", "missing.gba", "-m", "other.toml", "list"]).unwrap();
	assert_eq!(cli.metadata_path(), Some(PathBuf::from("other.toml")));
}

#[test]
fn missing_sibling_metadata_is_none() {
	let cli = Cli::try_parse_from(["hexweave", "/nonexistent/missing.gba", "check"]).unwrap();
	assert_eq!(cli.metadata_path(), None);
}
