use crate::{
    config::EngineConfig,
    entity::{Entity, EntityId},
    error::{Error, Result},
    rating::{self, Outcome, MIN_RATING},
};
use derive_more::Display;
use rand::{rngs::StdRng, seq::IndexedRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, Default, Display, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Independent pairs of similarly rated entities.
    #[default]
    #[display("swiss")]
    Swiss,
    /// A champion climbs until beaten; the beaten champion then falls until it wins a match.
    #[display("gauntlet")]
    Gauntlet,
    /// Like gauntlet, but a beaten champion simply drops out of the run.
    #[display("champion")]
    Champion,
}

impl std::str::FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "swiss" => Ok(Self::Swiss),
            "gauntlet" => Ok(Self::Gauntlet),
            "champion" => Ok(Self::Champion),
            _ => anyhow::bail!("unknown mode {s}"),
        }
    }
}

/// How an entity takes part in a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The entity whose placement the match is deciding. Its rating moves.
    Active,
    /// A benchmark the active entity is measured against. Its rating stays put.
    Defender,
}

/// Two entities to compare, with their 1-based ranks at selection time.
///
/// Ranks are `None` when the pair was drawn from a random sample rather than the full ranking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComparisonPair {
    pub entities: [Entity; 2],
    pub ranks: [Option<usize>; 2],
}

impl ComparisonPair {
    fn ranked(ranking: &[Entity], a: usize, b: usize) -> Self {
        Self {
            entities: [ranking[a].clone(), ranking[b].clone()],
            ranks: [Some(a + 1), Some(b + 1)],
        }
    }

    /// The index (0 or 1) of `id` within the pair.
    pub fn position(&self, id: &EntityId) -> Option<usize> {
        self.entities.iter().position(|entity| &entity.id == id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.position(id).is_some()
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalKind {
    /// The champion has beaten everyone ranked at or above it.
    #[display("victory")]
    Victory,
    /// A fallen champion has found its final place.
    #[display("placement")]
    Placement,
}

/// The end of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalEvent {
    pub kind: TerminalKind,
    pub entity: Entity,
    pub rank: usize,
    pub rating: i32,
}

/// What a front-end shows alongside a pair while a run is in progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Climbing {
        champion: EntityId,
        streak: u32,
        rank: Option<usize>,
    },
    Falling {
        entity: EntityId,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunState {
    champion: Option<Entity>,
    win_streak: u32,
    champion_rank: Option<usize>,
    /// Opponents the champion has beaten, or, while falling, opponents the falling entity has
    /// already faced.
    defeated: BTreeSet<EntityId>,
    /// The dethroned champion looking for its floor. Gauntlet mode only.
    falling: Option<Entity>,
}

impl RunState {
    pub fn champion(&self) -> Option<&Entity> {
        self.champion.as_ref()
    }

    pub fn win_streak(&self) -> u32 {
        self.win_streak
    }

    pub fn champion_rank(&self) -> Option<usize> {
        self.champion_rank
    }

    pub fn defeated(&self) -> &BTreeSet<EntityId> {
        &self.defeated
    }

    pub fn falling(&self) -> Option<&Entity> {
        self.falling.as_ref()
    }

    pub fn is_falling(&self) -> bool {
        self.falling.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.champion.is_some() || self.falling.is_some()
    }
}

/// The entities a selection is made from.
#[derive(Clone, Debug)]
pub enum Pool {
    /// Every entity matching the filter.
    Ranked(Vec<Entity>),
    /// A random subset of the matching entities; ranks are meaningless.
    Sample(Vec<Entity>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Pair(ComparisonPair),
    Terminal(TerminalEvent),
}

/// How the run moved after a pick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Continue,
    /// A dethroned champion was placed just below its conqueror and starts falling.
    Relocated { entity: EntityId, rating: i32 },
    Terminal(TerminalEvent),
}

#[derive(Debug)]
pub struct Matchmaker<R = StdRng> {
    mode: Mode,
    run: RunState,
    config: EngineConfig,
    rng: R,
}

impl Matchmaker<StdRng> {
    pub fn new(mode: Mode, config: EngineConfig) -> Self {
        Self::with_rng(mode, config, StdRng::from_os_rng())
    }
}

impl<R: Rng> Matchmaker<R> {
    pub fn with_rng(mode: Mode, config: EngineConfig, rng: R) -> Self {
        Self {
            mode,
            run: RunState::default(),
            config,
            rng,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(&self) -> &RunState {
        &self.run
    }

    /// Switch modes, abandoning any run. Returns `false` if `mode` is already active, in which case
    /// nothing changes.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if mode == self.mode {
            return false;
        }
        self.mode = mode;
        self.reset();
        true
    }

    pub fn reset(&mut self) {
        self.run = RunState::default();
    }

    pub fn run_active(&self) -> bool {
        self.mode != Mode::Swiss && self.run.is_active()
    }

    pub fn status(&self) -> Option<RunStatus> {
        if self.mode == Mode::Swiss {
            return None;
        }
        if let Some(falling) = &self.run.falling {
            return Some(RunStatus::Falling {
                entity: falling.id.clone(),
            });
        }
        self.run.champion.as_ref().map(|champion| RunStatus::Climbing {
            champion: champion.id.clone(),
            streak: self.run.win_streak,
            rank: self.run.champion_rank,
        })
    }

    pub fn role(&self, id: &EntityId) -> Role {
        let active = match self.mode {
            Mode::Swiss => true,
            Mode::Gauntlet | Mode::Champion => {
                self.run.falling.as_ref().is_some_and(|e| &e.id == id)
                    || (self.run.falling.is_none()
                        && self.run.champion.as_ref().is_some_and(|e| &e.id == id))
            }
        };
        if active {
            Role::Active
        } else {
            Role::Defender
        }
    }

    /// Choose the next pair to show, or end the run if there is nobody left to face.
    pub fn select(&mut self, pool: Pool) -> Result<Selection> {
        let (entities, sampled) = match pool {
            Pool::Ranked(entities) => (entities, false),
            Pool::Sample(entities) => (entities, true),
        };
        if entities.len() < 2 {
            return Err(Error::PoolTooSmall {
                found: entities.len(),
            });
        }

        if sampled {
            let mut pair = entities.choose_multiple(&mut self.rng, 2).cloned();
            if let (Some(a), Some(b)) = (pair.next(), pair.next()) {
                return Ok(Selection::Pair(ComparisonPair {
                    entities: [a, b],
                    ranks: [None, None],
                }));
            }
        }

        let ranking = rank(entities);
        match self.mode {
            Mode::Swiss => Ok(Selection::Pair(self.swiss(&ranking))),
            Mode::Gauntlet | Mode::Champion => Ok(self.next_in_run(&ranking)),
        }
    }

    /// Update the run after `winner` beat `loser`, given the ratings the match produced.
    pub fn record(
        &mut self,
        winner: &Entity,
        loser: &Entity,
        loser_rank: Option<usize>,
        outcome: &Outcome,
    ) -> Transition {
        if self.mode == Mode::Swiss {
            return Transition::Continue;
        }
        let winner = winner.with_rating(outcome.winner.new);
        let loser = loser.with_rating(outcome.loser.new);

        if let Some(falling) = &self.run.falling {
            if falling.id == winner.id {
                let rating = rating::above(loser.rating());
                let rank = loser_rank.map_or(1, |rank| rank.saturating_sub(1).max(1));
                tracing::info!(id = %winner.id, rank, rating, "falling entity found its floor");
                return Transition::Terminal(TerminalEvent {
                    kind: TerminalKind::Placement,
                    entity: winner.with_rating(rating),
                    rank,
                    rating,
                });
            }
            tracing::debug!(id = %loser.id, conqueror = %winner.id, "still falling");
            self.run.defeated.insert(winner.id);
            self.run.falling = Some(loser);
            return Transition::Continue;
        }

        let champion_won = self.run.champion.as_ref().map(|champion| champion.id == winner.id);
        match champion_won {
            None => {
                tracing::debug!(champion = %winner.id, "run started");
                self.crown(winner, loser.id);
                Transition::Continue
            }
            Some(true) => {
                self.run.defeated.insert(loser.id);
                self.run.win_streak += 1;
                self.run.champion = Some(winner);
                Transition::Continue
            }
            Some(false) if self.mode == Mode::Gauntlet => {
                let rating = rating::below(winner.rating());
                tracing::info!(
                    dethroned = %loser.id,
                    champion = %winner.id,
                    rating,
                    "champion dethroned"
                );
                let relocated = Transition::Relocated {
                    entity: loser.id.clone(),
                    rating,
                };
                let conqueror = winner.id.clone();
                self.crown(winner, conqueror);
                self.run.falling = Some(loser.with_rating(rating));
                relocated
            }
            Some(false) => {
                tracing::info!(dethroned = %loser.id, champion = %winner.id, "champion dethroned");
                self.crown(winner, loser.id);
                Transition::Continue
            }
        }
    }

    fn crown(&mut self, champion: Entity, defeated: EntityId) {
        self.run.champion = Some(champion);
        self.run.win_streak = 1;
        self.run.champion_rank = None;
        self.run.defeated = [defeated].into();
    }

    fn swiss(&mut self, ranking: &[Entity]) -> ComparisonPair {
        let a = self.rng.random_range(0..ranking.len());
        let rating = ranking[a].rating();
        let distance = |i: &usize| (ranking[*i].rating() - rating).abs();

        let close: Vec<usize> = (0..ranking.len())
            .filter(|i| *i != a && distance(i) <= self.config.swiss_window)
            .collect();
        let b = match close.choose(&mut self.rng) {
            Some(b) => *b,
            None => (0..ranking.len())
                .filter(|i| *i != a)
                .min_by_key(distance)
                .unwrap_or(if a == 0 { 1 } else { 0 }),
        };
        ComparisonPair::ranked(ranking, a, b)
    }

    fn next_in_run(&mut self, ranking: &[Entity]) -> Selection {
        if let Some(falling) = &self.run.falling {
            match ranking.iter().position(|e| e.id == falling.id) {
                Some(index) => return self.fall(ranking, index),
                None => {
                    tracing::warn!(id = %falling.id, "falling entity left the pool, abandoning run");
                    self.reset();
                }
            }
        }
        if let Some(champion) = &self.run.champion {
            match ranking.iter().position(|e| e.id == champion.id) {
                Some(index) => return self.climb(ranking, index),
                None => {
                    tracing::warn!(id = %champion.id, "champion left the pool, abandoning run");
                    self.reset();
                }
            }
        }

        // No run yet: a random challenger starts against the floor of the ranking.
        let challenger = self.rng.random_range(0..ranking.len());
        let floor = if challenger == ranking.len() - 1 {
            ranking.len() - 2
        } else {
            ranking.len() - 1
        };
        Selection::Pair(ComparisonPair::ranked(ranking, challenger, floor))
    }

    fn climb(&mut self, ranking: &[Entity], index: usize) -> Selection {
        let champion = &ranking[index];
        self.run.champion = Some(champion.clone());
        self.run.champion_rank = Some(index + 1);

        // The nearest unbeaten opponent at or above the champion.
        let opponent = ranking
            .iter()
            .enumerate()
            .filter(|(i, e)| {
                e.id != champion.id
                    && !self.run.defeated.contains(&e.id)
                    && (*i < index || e.rating() >= champion.rating())
            })
            .map(|(i, _)| i)
            .last();

        match opponent {
            Some(opponent) => Selection::Pair(ComparisonPair::ranked(ranking, index, opponent)),
            None => {
                tracing::info!(id = %champion.id, streak = self.run.win_streak, "champion victorious");
                self.run.champion_rank = Some(1);
                Selection::Terminal(TerminalEvent {
                    kind: TerminalKind::Victory,
                    entity: champion.clone(),
                    rank: 1,
                    rating: champion.rating(),
                })
            }
        }
    }

    fn fall(&mut self, ranking: &[Entity], index: usize) -> Selection {
        self.run.falling = Some(ranking[index].clone());

        // The nearest entity below that the falling entity has not faced yet.
        let opponent = (index + 1..ranking.len()).find(|i| !self.run.defeated.contains(&ranking[*i].id));

        match opponent {
            Some(opponent) => Selection::Pair(ComparisonPair::ranked(ranking, index, opponent)),
            None => {
                let entity = ranking[index].with_rating(MIN_RATING);
                tracing::info!(id = %entity.id, "falling entity reached the bottom");
                Selection::Terminal(TerminalEvent {
                    kind: TerminalKind::Placement,
                    entity,
                    rank: ranking.len(),
                    rating: MIN_RATING,
                })
            }
        }
    }
}

/// Sort by rating, highest first. Ties go to the lower id so that selection is deterministic.
pub fn rank(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort_by(|a, b| b.rating().cmp(&a.rating()).then_with(|| a.id.cmp(&b.id)));
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::Elo;
    use std::collections::HashMap;

    fn entity(id: &str, rating: i32) -> Entity {
        Entity::new(id, format!("entity {id}"), Some(rating))
    }

    fn pool(ratings: &[(&str, i32)]) -> Vec<Entity> {
        ratings.iter().map(|(id, r)| entity(id, *r)).collect()
    }

    fn matchmaker(mode: Mode, seed: u64) -> Matchmaker<StdRng> {
        Matchmaker::with_rng(mode, EngineConfig::default(), StdRng::seed_from_u64(seed))
    }

    fn expect_pair(selection: Selection) -> ComparisonPair {
        match selection {
            Selection::Pair(pair) => pair,
            Selection::Terminal(event) => panic!("expected a pair, got {event:?}"),
        }
    }

    /// A tiny in-memory library that applies the outcome of each pick the way a session would.
    struct Library {
        entities: HashMap<EntityId, Entity>,
        elo: Elo,
    }

    impl Library {
        fn new(entities: Vec<Entity>) -> Self {
            Self {
                entities: entities.into_iter().map(|e| (e.id.clone(), e)).collect(),
                elo: Elo::default(),
            }
        }

        fn pool(&self) -> Pool {
            Pool::Ranked(self.entities.values().cloned().collect())
        }

        fn rating(&self, id: &str) -> i32 {
            self.entities[&EntityId::from(id)].rating()
        }

        fn set(&mut self, id: &EntityId, rating: i32) {
            let entity = self.entities[id].with_rating(rating);
            self.entities.insert(id.clone(), entity);
        }

        fn pick(&mut self, mm: &mut Matchmaker, pair: &ComparisonPair, winner: usize) -> Transition {
            let (w, l) = (&pair.entities[winner], &pair.entities[1 - winner]);
            let loser_rank = pair.ranks[1 - winner];
            let outcome = self.elo.outcome(
                mm.mode(),
                w.rating(),
                l.rating(),
                mm.role(&w.id),
                mm.role(&l.id),
                loser_rank,
            );
            self.set(&w.id, outcome.winner.new);
            self.set(&l.id, outcome.loser.new);
            let transition = mm.record(w, l, loser_rank, &outcome);
            match &transition {
                Transition::Relocated { entity, rating } => self.set(entity, *rating),
                Transition::Terminal(event) if event.kind == TerminalKind::Placement => {
                    self.set(&event.entity.id, event.rating)
                }
                _ => {}
            }
            transition
        }
    }

    #[test]
    fn test_pool_too_small() {
        let mut mm = matchmaker(Mode::Swiss, 0);
        assert!(matches!(
            mm.select(Pool::Ranked(pool(&[("1", 50)]))),
            Err(Error::PoolTooSmall { found: 1 })
        ));
        assert!(matches!(
            mm.select(Pool::Sample(vec![])),
            Err(Error::PoolTooSmall { found: 0 })
        ));
    }

    #[test]
    fn test_rank_breaks_ties_by_id() {
        let ranking = rank(pool(&[("b", 50), ("c", 70), ("a", 50)]));
        let ids: Vec<_> = ranking.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn test_swiss_pairs_within_window() {
        // Pool of [20, 55, 60, 90]: whenever 55 is drawn first its partner must be 60.
        let entities = pool(&[("a", 20), ("b", 55), ("c", 60), ("d", 90)]);
        let mut seen = false;
        for seed in 0..200 {
            let mut mm = matchmaker(Mode::Swiss, seed);
            let pair = expect_pair(mm.select(Pool::Ranked(entities.clone())).unwrap());
            if pair.entities[0].rating() == 55 {
                seen = true;
                assert_eq!(pair.entities[1].rating(), 60);
                assert_eq!(pair.ranks, [Some(3), Some(2)]);
            }
        }
        assert!(seen);
    }

    #[test]
    fn test_swiss_falls_back_to_closest() {
        let entities = pool(&[("a", 1), ("b", 40), ("c", 100)]);
        for seed in 0..50 {
            let mut mm = matchmaker(Mode::Swiss, seed);
            let pair = expect_pair(mm.select(Pool::Ranked(entities.clone())).unwrap());
            let expected = match pair.entities[0].id.as_str() {
                "a" | "c" => "b",
                _ => "a",
            };
            assert_eq!(pair.entities[1].id.as_str(), expected);
            assert_ne!(pair.entities[0].id, pair.entities[1].id);
        }
    }

    #[test]
    fn test_sampled_pool_has_no_ranks() {
        let mut mm = matchmaker(Mode::Swiss, 3);
        let pair = expect_pair(mm.select(Pool::Sample(pool(&[("a", 10), ("b", 20), ("c", 30)]))).unwrap());
        assert_eq!(pair.ranks, [None, None]);
        assert_ne!(pair.entities[0].id, pair.entities[1].id);
    }

    #[test]
    fn test_swiss_keeps_no_state() {
        let mut mm = matchmaker(Mode::Swiss, 1);
        let (a, b) = (entity("a", 50), entity("b", 50));
        let outcome = Elo::default().outcome(Mode::Swiss, 50, 50, Role::Active, Role::Active, None);
        assert_eq!(mm.record(&a, &b, Some(2), &outcome), Transition::Continue);
        assert!(!mm.run().is_active());
        assert_eq!(mm.status(), None);
        assert_eq!(mm.role(&a.id), Role::Active);
    }

    #[test]
    fn test_run_starts_against_floor() {
        let entities = pool(&[("a", 90), ("b", 70), ("c", 50), ("d", 10)]);
        for seed in 0..20 {
            let mut mm = matchmaker(Mode::Gauntlet, seed);
            let pair = expect_pair(mm.select(Pool::Ranked(entities.clone())).unwrap());
            let floor = if pair.entities[0].id.as_str() == "d" { "c" } else { "d" };
            assert_eq!(pair.entities[1].id.as_str(), floor);
            assert!(!mm.run().is_active());
        }
    }

    #[test]
    fn test_first_pick_crowns_winner() {
        let mut library = Library::new(pool(&[("a", 90), ("b", 70), ("c", 50), ("d", 10)]));
        let mut mm = matchmaker(Mode::Gauntlet, 7);
        let pair = expect_pair(mm.select(library.pool()).unwrap());
        let before = (pair.entities[0].rating(), pair.entities[1].rating());

        assert_eq!(library.pick(&mut mm, &pair, 0), Transition::Continue);
        let run = mm.run();
        assert_eq!(run.champion().unwrap().id, pair.entities[0].id);
        assert_eq!(run.win_streak(), 1);
        assert_eq!(run.defeated(), &BTreeSet::from([pair.entities[1].id.clone()]));
        // Nobody is active before the run exists, so neither rating moved.
        assert_eq!(library.rating(pair.entities[0].id.as_str()), before.0);
        assert_eq!(library.rating(pair.entities[1].id.as_str()), before.1);
    }

    #[test]
    fn test_climb_to_victory() {
        let mut library = Library::new(pool(&[("a", 90), ("b", 70), ("c", 50)]));
        let mut mm = matchmaker(Mode::Gauntlet, 0);
        let (c, b) = (entity("c", 50), entity("b", 70));
        let outcome = Elo::default().outcome(Mode::Gauntlet, 50, 70, Role::Defender, Role::Defender, Some(2));
        mm.record(&c, &b, Some(2), &outcome);

        // The champion, ranked 3rd of 3, has already beaten b; a remains.
        let pair = expect_pair(mm.select(library.pool()).unwrap());
        assert_eq!(pair.entities[0].id.as_str(), "c");
        assert_eq!(pair.entities[1].id.as_str(), "a");
        assert_eq!(mm.run().champion_rank(), Some(3));
        assert_eq!(library.pick(&mut mm, &pair, 0), Transition::Continue);
        assert_eq!(mm.run().win_streak(), 2);
        assert!(library.rating("c") > 50);
        assert_eq!(library.rating("a"), 89, "top defender pays a single point");

        match mm.select(library.pool()).unwrap() {
            Selection::Terminal(event) => {
                assert_eq!(event.kind, TerminalKind::Victory);
                assert_eq!(event.rank, 1);
                assert_eq!(event.entity.id.as_str(), "c");
            }
            Selection::Pair(pair) => panic!("expected victory, got {pair:?}"),
        }
        assert_eq!(mm.run().champion_rank(), Some(1));
    }

    #[test]
    fn test_climbing_never_offers_a_rematch() {
        let entities: Vec<_> = (0..12).map(|i| entity(&format!("e{i:02}"), 5 + i * 8)).collect();
        for seed in 0..10 {
            let mut library = Library::new(entities.clone());
            let mut mm = matchmaker(Mode::Champion, seed);
            let pair = expect_pair(mm.select(library.pool()).unwrap());
            library.pick(&mut mm, &pair, 0);
            let champion = pair.entities[0].id.clone();

            let mut offered = BTreeSet::new();
            offered.insert(pair.entities[1].id.clone());
            loop {
                match mm.select(library.pool()).unwrap() {
                    Selection::Pair(pair) => {
                        assert_eq!(pair.entities[0].id, champion);
                        let opponent = pair.entities[1].id.clone();
                        assert!(!mm.run().defeated().contains(&opponent));
                        assert!(offered.insert(opponent), "opponent offered twice");
                        library.pick(&mut mm, &pair, 0);
                    }
                    Selection::Terminal(event) => {
                        assert_eq!(event.kind, TerminalKind::Victory);
                        assert_eq!(event.entity.id, champion);
                        break;
                    }
                }
            }
            assert_eq!(mm.run().defeated().len(), offered.len());
        }
    }

    #[test]
    fn test_dethroned_champion_placed_below_conqueror() {
        let mut mm = matchmaker(Mode::Gauntlet, 0);
        let elo = Elo::default();
        let (king, floor, challenger) = (entity("king", 95), entity("floor", 5), entity("x", 80));
        mm.record(&king, &floor, Some(3), &elo.outcome(Mode::Gauntlet, 95, 5, Role::Defender, Role::Defender, Some(3)));

        let outcome = elo.outcome(
            Mode::Gauntlet,
            80,
            95,
            mm.role(&challenger.id),
            mm.role(&king.id),
            Some(1),
        );
        assert_eq!(outcome.winner.new, 80);
        let transition = mm.record(&challenger, &king, Some(1), &outcome);
        assert_eq!(
            transition,
            Transition::Relocated {
                entity: king.id.clone(),
                rating: 79
            }
        );
        let run = mm.run();
        assert_eq!(run.falling().unwrap().rating(), 79);
        assert_eq!(run.champion().unwrap().id, challenger.id);
        assert_eq!(run.win_streak(), 1);
        assert_eq!(run.defeated(), &BTreeSet::from([challenger.id.clone()]));
        assert_eq!(mm.role(&king.id), Role::Active);
        assert_eq!(mm.role(&challenger.id), Role::Defender);
        assert_eq!(mm.status(), Some(RunStatus::Falling { entity: king.id }));
    }

    #[test]
    fn test_falling_entity_finds_floor() {
        let mut library = Library::new(pool(&[("a", 90), ("b", 60), ("f", 40), ("c", 30), ("d", 10)]));
        let mut mm = matchmaker(Mode::Gauntlet, 0);
        let elo = Elo::default();
        let (f, d, b) = (entity("f", 40), entity("d", 10), entity("b", 60));
        mm.record(&f, &d, Some(5), &elo.outcome(Mode::Gauntlet, 40, 10, Role::Defender, Role::Defender, Some(5)));
        // b dethrones f; f is placed at 59 and starts falling from just below b.
        let outcome = elo.outcome(Mode::Gauntlet, 60, 40, mm.role(&b.id), mm.role(&f.id), Some(3));
        let transition = mm.record(&b, &f, Some(3), &outcome);
        assert!(matches!(transition, Transition::Relocated { rating: 59, .. }));
        // The relocation is not written back, so f still sits at 40 in the library.

        let pair = expect_pair(mm.select(library.pool()).unwrap());
        assert_eq!(pair.entities[0].id.as_str(), "f");
        assert_eq!(pair.entities[1].id.as_str(), "c");
        assert_eq!(pair.ranks, [Some(3), Some(4)]);

        match library.pick(&mut mm, &pair, 0) {
            Transition::Terminal(event) => {
                assert_eq!(event.kind, TerminalKind::Placement);
                assert_eq!(event.rating, 31);
                assert_eq!(event.rank, 3);
                assert_eq!(event.entity.id.as_str(), "f");
            }
            other => panic!("expected placement, got {other:?}"),
        }
        assert_eq!(library.rating("f"), 31);
        assert_eq!(library.rating("c"), 30);
    }

    #[test]
    fn test_falling_to_the_bottom_terminates() {
        let entities: Vec<_> = (0..8).map(|i| entity(&format!("e{i}"), 90 - i * 10)).collect();
        let n = entities.len();
        let mut library = Library::new(entities);
        let mut mm = matchmaker(Mode::Gauntlet, 0);
        let elo = Elo::default();

        let (top, bottom, second) = (entity("e0", 90), entity("e7", 20), entity("e1", 80));
        mm.record(&top, &bottom, Some(8), &elo.outcome(Mode::Gauntlet, 90, 20, Role::Defender, Role::Defender, Some(8)));
        let outcome = elo.outcome(Mode::Gauntlet, 80, 90, mm.role(&second.id), mm.role(&top.id), Some(1));
        if let Transition::Relocated { entity, rating } = mm.record(&second, &top, Some(1), &outcome) {
            library.set(&entity, rating);
        }

        let mut steps = 0;
        loop {
            match mm.select(library.pool()).unwrap() {
                Selection::Pair(pair) => {
                    steps += 1;
                    assert!(steps < n, "falling did not terminate");
                    assert_eq!(pair.entities[0].id.as_str(), "e0");
                    // The falling entity loses every match.
                    assert_eq!(library.pick(&mut mm, &pair, 1), Transition::Continue);
                }
                Selection::Terminal(event) => {
                    assert_eq!(event.kind, TerminalKind::Placement);
                    assert_eq!(event.rank, n);
                    assert_eq!(event.rating, 1);
                    break;
                }
            }
        }
        assert_eq!(steps, n - 2);
    }

    #[test]
    fn test_champion_mode_discards_loser() {
        let mut mm = matchmaker(Mode::Champion, 0);
        let elo = Elo::default();
        let (a, b, c) = (entity("a", 50), entity("b", 20), entity("c", 70));
        mm.record(&a, &b, Some(3), &elo.outcome(Mode::Champion, 50, 20, Role::Defender, Role::Defender, Some(3)));
        let outcome = elo.outcome(Mode::Champion, 70, 50, mm.role(&c.id), mm.role(&a.id), Some(2));
        assert_eq!(mm.record(&c, &a, Some(2), &outcome), Transition::Continue);
        let run = mm.run();
        assert!(!run.is_falling());
        assert_eq!(run.champion().unwrap().id, c.id);
        assert_eq!(run.win_streak(), 1);
        assert_eq!(run.defeated(), &BTreeSet::from([a.id]));
    }

    #[test]
    fn test_missing_champion_restarts_run() {
        let mut mm = matchmaker(Mode::Champion, 0);
        let (a, b) = (entity("a", 50), entity("b", 20));
        let outcome = Elo::default().outcome(Mode::Champion, 50, 20, Role::Defender, Role::Defender, None);
        mm.record(&a, &b, None, &outcome);
        assert!(mm.run_active());

        let selection = mm.select(Pool::Ranked(pool(&[("x", 40), ("y", 30)]))).unwrap();
        assert!(matches!(selection, Selection::Pair(_)));
        assert!(!mm.run_active());
    }

    #[test]
    fn test_set_mode() {
        let mut mm = matchmaker(Mode::Gauntlet, 0);
        let (a, b) = (entity("a", 50), entity("b", 20));
        let outcome = Elo::default().outcome(Mode::Gauntlet, 50, 20, Role::Defender, Role::Defender, None);
        mm.record(&a, &b, None, &outcome);

        assert!(!mm.set_mode(Mode::Gauntlet));
        assert!(mm.run_active());
        assert!(mm.set_mode(Mode::Champion));
        assert!(!mm.run_active());
        assert_eq!(mm.run(), &RunState::default());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("champion".parse::<Mode>().unwrap(), Mode::Champion);
        assert_eq!(Mode::Gauntlet.to_string(), "gauntlet");
        assert!("ladder".parse::<Mode>().is_err());
    }
}
