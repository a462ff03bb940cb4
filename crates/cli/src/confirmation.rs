use std::io::{stdin, stdout, BufRead, Write};

use runwatch_core::error::Result;

/// Asks `message` until the answer is yes or no. An empty answer means yes.
///
/// Returns `false` if the input ends before an answer is given.
pub fn read_confirmation<R: BufRead, W: Write>(
    message: &str,
    input: &mut R,
    output: &mut W,
) -> Result<bool> {
    loop {
        write!(output, "{message} ([Y]es/[n]o): ")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(false);
        }

        match answer.trim().to_lowercase().as_str() {
            "" | "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
    }
}

/// Confirms with the user on the terminal.
pub fn prompt_confirmation(message: &str) -> Result<bool> {
    read_confirmation(message, &mut stdin().lock(), &mut stdout())
}
