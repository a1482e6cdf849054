use std::io::{self, BufRead, Write};

use pikere::Regex;

fn prompt(out: &mut impl Write, text: &str) -> io::Result<()> {
    write!(out, "{text}")?;
    out.flush()
}

fn main() -> io::Result<()> {
    env_logger::init();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stdout = io::stdout();

    println!("Pike VM Regex REPL");
    println!("Type an empty pattern to exit.");

    loop {
        prompt(&mut stdout, "regex> ")?;
        let Some(pattern) = lines.next().transpose()? else {
            break;
        };
        let pattern = pattern.trim();
        if pattern.is_empty() {
            break;
        }

        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        println!("syntax: {}", re.syntax());
        print!("{}", re.program());

        println!("Type return to go back to the regex prompt.");
        loop {
            prompt(&mut stdout, "input> ")?;
            let Some(input) = lines.next().transpose()? else {
                return Ok(());
            };
            if input == "return" {
                break;
            }
            match re.find_captures(&input) {
                Some(caps) => {
                    println!("Matched!");
                    for (i, group) in caps.iter().enumerate() {
                        let name = re.capture_names()[i]
                            .as_deref()
                            .map(|n| format!(" ({n})"))
                            .unwrap_or_default();
                        match group {
                            Some(m) => println!(
                                "Group {i}{name}: {:?} at {}..{}",
                                m.as_str(),
                                m.start(),
                                m.end()
                            ),
                            None => println!("Group {i}{name}: None"),
                        }
                    }
                }
                None => println!("No match."),
            }
        }
    }
    Ok(())
}
