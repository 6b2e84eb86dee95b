//! Interactive answers to login challenges.

use std::io::{self, BufRead, Write};

use harvest_logging::harvest_error;
use harvester_engine::{AuthError, ChallengeKind, ChallengeResolver};

/// Asks the operator on the terminal.
pub struct ConsoleChallenges;

impl ChallengeResolver for ConsoleChallenges {
    fn resolve(&self, challenge: ChallengeKind) -> Result<String, AuthError> {
        read_answer(challenge, &mut io::stdin().lock(), &mut io::stderr()).map_err(|err| {
            harvest_error!("could not read the {challenge}: {err}");
            AuthError::ChallengeAborted(challenge)
        })
    }
}

fn read_answer(
    challenge: ChallengeKind,
    input: &mut impl BufRead,
    prompt: &mut impl Write,
) -> io::Result<String> {
    write!(prompt, "Enter the {challenge} shown in the browser: ")?;
    prompt.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
    }
    Ok(line.trim().to_string())
}
