use ansi_term::{Colour, Style};
use hotornot_core::{
    ComparisonPair, Entity, EntityId, EntityStats, Frontend, RunStatus, TerminalEvent,
    TerminalKind,
};
use itertools::Itertools;

/// Prints session events to standard output.
#[derive(Clone, Copy, Debug, Default)]
pub struct Terminal;

impl Frontend for Terminal {
    fn on_pair_ready(&self, pair: &ComparisonPair, status: Option<&RunStatus>) {
        println!("\n{}", pair_screen(pair, status));
    }

    fn on_terminal_event(&self, event: &TerminalEvent) {
        println!("\n{}", terminal_screen(event));
    }

    fn on_pool_too_small_error(&self, message: &str) {
        println!("{}", Colour::Yellow.paint(message));
        println!("Change the filter (f resets it) or switch kinds.");
    }

    fn on_repository_error(&self, message: &str) {
        println!("{}", Colour::Red.paint(message));
        println!("Press r to retry.");
    }
}

pub fn pair_screen(pair: &ComparisonPair, status: Option<&RunStatus>) -> String {
    let mut lines = vec![];
    if let Some(status) = status {
        lines.push(Style::new().italic().paint(status_line(status)).to_string());
    }
    for (i, (entity, rank)) in pair.entities.iter().zip(pair.ranks).enumerate() {
        lines.push(format!(
            "  [{}] {}",
            i + 1,
            entity_line(entity, rank)
        ));
    }
    lines.join("\n")
}

pub fn terminal_screen(event: &TerminalEvent) -> String {
    let headline = match event.kind {
        TerminalKind::Victory => Colour::Green
            .bold()
            .paint(format!("{} is the new #1!", display_name(&event.entity))),
        TerminalKind::Placement => Colour::Cyan.bold().paint(format!(
            "{} settles at #{}",
            display_name(&event.entity),
            event.rank
        )),
    };
    format!(
        "{headline}\n  final rating {}\n  press enter to start a new run",
        event.rating
    )
}

pub fn top_table(entities: &[Entity]) -> String {
    entities
        .iter()
        .enumerate()
        .map(|(i, entity)| format!("{:>4}. {}", i + 1, entity_line(entity, None)))
        .join("\n")
}

pub fn stats_table(id: &EntityId, stats: &EntityStats) -> String {
    let win_rate = stats
        .win_rate()
        .map_or("-".to_string(), |rate| format!("{:.0}%", rate * 100.0));
    let last_match = stats
        .last_match
        .map_or("never".to_string(), |ts| ts.format("%Y-%m-%d %H:%M").to_string());
    [
        Style::new().bold().paint(id.to_string()).to_string(),
        format!("  matches      {}", stats.matches),
        format!("  wins/losses  {}/{} ({win_rate})", stats.wins, stats.losses),
        format!("  streak       {:+}", stats.streak),
        format!(
            "  best/worst   {:+}/{:+}",
            stats.best_streak, stats.worst_streak
        ),
        format!("  last match   {last_match}"),
    ]
    .join("\n")
}

fn status_line(status: &RunStatus) -> String {
    match status {
        RunStatus::Climbing {
            champion,
            streak,
            rank,
        } => {
            let rank = rank.map_or(String::new(), |rank| format!(", ranked #{rank}"));
            format!("champion {champion}: {streak} win(s){rank}")
        }
        RunStatus::Falling { entity } => format!("{entity} is looking for its floor"),
    }
}

fn entity_line(entity: &Entity, rank: Option<usize>) -> String {
    let rank = rank.map_or(String::new(), |rank| format!(" #{rank}"));
    format!(
        "{}{} ({})",
        Style::new().bold().paint(display_name(entity)),
        Colour::Fixed(245).paint(rank),
        entity.rating()
    )
}

fn display_name(entity: &Entity) -> String {
    if entity.name.is_empty() {
        entity.id.to_string()
    } else {
        entity.name.clone()
    }
}
