//! A simple CLI tool for re-tallying an exported ballot box offline.
//! This uses the server's own decryption and counting code, and so reads
//! exactly what `GET /ballots` returns.

use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use anonvote_backend::cipher::{BallotCipher, CipherConfig};
use anonvote_backend::model::{api::ballot::BallotDump, db::EncryptedBallot};
use anonvote_backend::tally::{tally_ballots, TallyReport};

const PROGRAM_NAME: &str = "tally-cli";

const ABOUT_TEXT: &str = "Decrypt and tally an exported ballot box.

EXIT CODES:
     0: Every position was decided.
   255: Ran successfully, but at least one position could not be decided.
 Other: Error.";

const DUMP_PATH: &str = "DUMP_PATH";
const SECRET: &str = "secret";
const SALT: &str = "salt";

const DUMP_PATH_HELP: &str = "The path to a JSON dump of the ballot box,\n\
as returned by `GET /ballots`";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(DUMP_PATH)
                .help(DUMP_PATH_HELP)
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(SECRET)
                .long(SECRET)
                .env("BALLOT_SECRET")
                .hide_env_values(true)
                .help("The ballot secret the server was configured with")
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(SALT)
                .long(SALT)
                .env("BALLOT_SALT")
                .hide_env_values(true)
                .help("The ballot salt the server was configured with")
                .action(ArgAction::Set)
                .required(true),
        )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump.
    Format(String),
    /// Could not derive the ballot key.
    Key(String),
}

/// Load the dump and tally it.
fn tally(path: &str, secret: &str, salt: &str) -> Result<TallyReport, Error> {
    // Load the file.
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let dump: BallotDump =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;

    // Rebuild the cipher the server used.
    let cipher = BallotCipher::new(&CipherConfig {
        secret: secret.to_string(),
        salt: salt.to_string(),
        kdf: dump.kdf,
    })
    .map_err(|e| Error::Key(e.to_string()))?;

    let ballots: Vec<EncryptedBallot> = dump.ballots.into_iter().map(Into::into).collect();
    Ok(tally_ballots(&ballots, &cipher, &dump.contests))
}

/// Run the tally, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    // Required arguments are guaranteed to be present.
    let path: &String = args.get_one(DUMP_PATH).unwrap();
    let secret: &String = args.get_one(SECRET).unwrap();
    let salt: &String = args.get_one(SALT).unwrap();

    match tally(path, secret, salt) {
        Ok(report) => {
            let participation = report.participation;
            println!(
                "{} ballot(s) in the box, {} decrypted, {} unreadable.",
                participation.total_ballots, participation.decrypted, participation.unreadable
            );
            let mut undecided = false;
            for (position, result) in &report.positions {
                println!();
                println!("== {position} ==");
                match result {
                    Ok(result) => print!("{result}"),
                    Err(err) => {
                        undecided = true;
                        println!("Could not be decided: {err}");
                    }
                }
            }
            if undecided {
                255
            } else {
                0
            }
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {}", msg);
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {}", msg);
            1
        }
        Err(Error::Key(msg)) => {
            println!("Bad ballot secret: {}", msg);
            1
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use anonvote_backend::kdf::Argon2Params;
    use anonvote_backend::model::{
        api::ballot::BallotRecord,
        common::{BallotPreference, CandidateId, Contests, Position},
    };
    use anonvote_backend::tally::TallyError;

    use super::*;

    const TEST_SECRET: &str = "correct horse battery staple";
    const TEST_SALT: &str = "ballot-box-test-salt";

    fn kdf() -> Argon2Params {
        Argon2Params {
            mem_cost: 64,
            time_cost: 1,
        }
    }

    /// Write a dump of the given rankings for a single "chair" contest.
    fn write_dump(name: &str, rankings: &[&[&str]]) -> PathBuf {
        let cipher = BallotCipher::new(&CipherConfig {
            secret: TEST_SECRET.to_string(),
            salt: TEST_SALT.to_string(),
            kdf: kdf(),
        })
        .unwrap();
        let ballots = rankings
            .iter()
            .map(|names| {
                let preference = BallotPreference::new(
                    "chair".into(),
                    names.iter().map(|&name| name.into()).collect(),
                );
                let sealed = cipher.encrypt(&preference).unwrap();
                BallotRecord::from(EncryptedBallot::new(sealed, Utc::now()))
            })
            .collect();
        let dump = BallotDump {
            contests: Contests::from([(
                Position::from("chair"),
                vec!["alice".into(), "bob".into(), "carol".into()],
            )]),
            kdf: kdf(),
            ballots,
        };

        let path = std::env::temp_dir().join(format!("{PROGRAM_NAME}-{name}.json"));
        std::fs::write(&path, serde_json::to_string(&dump).unwrap()).unwrap();
        path
    }

    fn path_str(path: &PathBuf) -> &str {
        path.to_str().unwrap()
    }

    #[test]
    fn tallying() {
        // This test actually enters backend code, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["anonvote_backend"], None, None);

        let path = write_dump(
            "decided",
            &[&["alice"], &["bob", "alice"], &["carol", "bob"], &["bob"], &["alice", "carol"]],
        );
        let report = tally(path_str(&path), TEST_SECRET, TEST_SALT).unwrap();
        assert_eq!(report.participation.decrypted, 5);
        let result = report.positions[&Position::from("chair")].as_ref().unwrap();
        assert_eq!(result.winner, CandidateId::from("bob"));
        assert_eq!(result.rounds.len(), 2);

        // The wrong secret leaves nothing readable.
        let report = tally(path_str(&path), "wrong", TEST_SALT).unwrap();
        assert_eq!(report.participation.unreadable, 5);
        assert_eq!(
            report.positions[&Position::from("chair")],
            Err(TallyError::NoBallots)
        );

        // Salts must be at least eight bytes.
        assert!(matches!(
            tally(path_str(&path), TEST_SECRET, "short"),
            Err(Error::Key(_))
        ));
        assert!(matches!(
            tally("not a real file", TEST_SECRET, TEST_SALT),
            Err(Error::IO(_))
        ));
    }

    #[test]
    fn malformed_records_are_unreadable() {
        let path = write_dump("malformed-record", &[&["alice"], &["bob"], &["alice", "bob"]]);
        let mut dump: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        dump["ballots"][1]["iv"] = "zz".into();
        std::fs::write(&path, dump.to_string()).unwrap();

        let report = tally(path_str(&path), TEST_SECRET, TEST_SALT).unwrap();
        assert_eq!(report.participation.total_ballots, 3);
        assert_eq!(report.participation.decrypted, 2);
        assert_eq!(report.participation.unreadable, 1);
        let result = report.positions[&Position::from("chair")].as_ref().unwrap();
        assert_eq!(result.winner, CandidateId::from("alice"));
    }

    #[test]
    fn correct_cli_usage() {
        let decided = write_dump("cli-decided", &[&["alice"], &["alice", "bob"], &["bob"]]);
        let empty = write_dump("cli-empty", &[]);
        let malformed = std::env::temp_dir().join(format!("{PROGRAM_NAME}-malformed.json"));
        std::fs::write(&malformed, "{\"contests\": ").unwrap();

        let exit_code = |path: &str| {
            let command_line = [
                PROGRAM_NAME,
                path,
                "--secret",
                TEST_SECRET,
                "--salt",
                TEST_SALT,
            ];
            run(&cli().try_get_matches_from(command_line).unwrap())
        };
        assert_eq!(exit_code(path_str(&decided)), 0);
        assert_eq!(exit_code(path_str(&empty)), 255);
        assert_eq!(exit_code(path_str(&malformed)), 1);
        assert_eq!(exit_code("not a real file"), 1);
    }

    #[test]
    fn bad_cli_usage() {
        // Something very wrong.
        let command_line = [PROGRAM_NAME, "this", "invocation", "is", "incorrect"];
        cli().try_get_matches_from(command_line).unwrap_err();

        // No options at all.
        let command_line = [PROGRAM_NAME];
        cli().try_get_matches_from(command_line).unwrap_err();
    }
}
