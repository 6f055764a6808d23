use crate::{backend::Backend, render::Terminal};
use anyhow::{bail, Context};
use hotornot_core::{Error, Filter, Library, Mode, Session};
use std::io::Write;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

const HELP: &str = "1/2 pick | s skip | m <mode> switch mode | f reset filter | r retry | enter continue | q quit";

/// A line typed at the ranking prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    /// Choose the first (0) or second (1) entity of the pair.
    Pick(usize),
    Skip,
    Mode(Mode),
    ResetFilter,
    Retry,
    Acknowledge,
    Help,
    Quit,
}

impl std::str::FromStr for Input {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut words = s.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Self::Acknowledge);
        };
        Ok(match command {
            "1" => Self::Pick(0),
            "2" => Self::Pick(1),
            "s" => Self::Skip,
            "m" => Self::Mode(words.next().context("missing mode")?.parse()?),
            "f" => Self::ResetFilter,
            "r" => Self::Retry,
            "?" | "h" => Self::Help,
            "q" => Self::Quit,
            _ => bail!("unknown command {command}"),
        })
    }
}

/// Run an interactive session on standard input until the user quits.
pub async fn run(
    session: Session<Backend, Terminal, Library>,
) -> anyhow::Result<()> {
    println!("{HELP}");
    report(session.next_pair().await);

    let mut lines = BufReader::new(stdin()).lines();
    loop {
        print!("[{}] > ", session.mode());
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = match line.parse::<Input>() {
            Ok(input) => input,
            Err(err) => {
                println!("{err:#}\n{HELP}");
                continue;
            }
        };

        let res = match input {
            Input::Pick(i) => pick(&session, i).await,
            Input::Skip => session.skip().await,
            Input::Mode(mode) => session.set_mode(mode).await,
            Input::ResetFilter => session.apply_filter(Filter::default()).await,
            Input::Retry => session.next_pair().await,
            Input::Acknowledge => {
                if session.pending_terminal().is_none() {
                    continue;
                }
                session.acknowledge().await
            }
            Input::Help => {
                println!("{HELP}");
                continue;
            }
            Input::Quit => break,
        };
        report(res);
    }
    Ok(())
}

async fn pick(session: &Session<Backend, Terminal, Library>, choice: usize) -> hotornot_core::Result<()> {
    if session.pending_terminal().is_some() {
        return Err(Error::AwaitingAcknowledgement);
    }
    let pair = session.current_pair().ok_or(Error::NoPair)?;
    session.pick_winner(&pair.entities[choice].id).await
}

/// Tell the user about errors the front-end has not already shown.
fn report(res: hotornot_core::Result<()>) {
    let Err(err) = res else {
        return;
    };
    match err {
        err if err.is_silent() => tracing::debug!("{err:#}"),
        // Already rendered through the front-end.
        Error::PoolTooSmall { .. } | Error::Repository(_) => {}
        err => println!("{err}"),
    }
}
