use crate::{
    config::EngineConfig,
    entity::EntityId,
    error::{Error, Result},
    filter::Filter,
    matchmaker::{
        ComparisonPair, Matchmaker, Mode, Pool, RunState, RunStatus, Selection, TerminalEvent,
        TerminalKind, Transition,
    },
    rating::Elo,
    report::{MatchResult, Reporter},
    repository::{EntityRepository, NoStats, StatsCollector},
};
use rand::{rngs::StdRng, Rng};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Mutex, MutexGuard, PoisonError,
};
use tracing::instrument;

/// The outward-facing half of a session: whatever shows pairs to the user.
pub trait Frontend {
    fn on_pair_ready(&self, pair: &ComparisonPair, status: Option<&RunStatus>);
    fn on_terminal_event(&self, event: &TerminalEvent);
    fn on_pool_too_small_error(&self, message: &str);
    /// Loading failed; the user may retry with [`Session::next_pair`].
    fn on_repository_error(&self, message: &str);
}

#[derive(Debug)]
struct State<G> {
    matchmaker: Matchmaker<G>,
    filter: Filter,
    pair: Option<ComparisonPair>,
    terminal: Option<TerminalEvent>,
}

/// Shows pairs drawn from a repository and applies the user's picks to their ratings.
#[derive(Debug)]
pub struct Session<R, U, S = NoStats, G = StdRng> {
    repo: R,
    ui: U,
    stats: S,
    elo: Elo,
    state: Mutex<State<G>>,
    generation: AtomicU64,
    in_flight: AtomicBool,
}

impl<R, U> Session<R, U> {
    pub fn new(repo: R, ui: U, mode: Mode, config: EngineConfig) -> Self {
        Self::with_matchmaker(repo, ui, Matchmaker::new(mode, config))
    }
}

impl<R, U, G: Rng> Session<R, U, NoStats, G> {
    pub fn with_matchmaker(repo: R, ui: U, matchmaker: Matchmaker<G>) -> Self {
        Self {
            repo,
            ui,
            stats: NoStats,
            elo: matchmaker.config().elo,
            state: Mutex::new(State {
                matchmaker,
                filter: Filter::default(),
                pair: None,
                terminal: None,
            }),
            generation: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        }
    }
}

impl<R, U, S, G> Session<R, U, S, G> {
    /// Report participation to `stats` instead of discarding it.
    pub fn with_stats<T>(self, stats: T) -> Session<R, U, T, G> {
        Session {
            repo: self.repo,
            ui: self.ui,
            stats,
            elo: self.elo,
            state: self.state,
            generation: self.generation,
            in_flight: self.in_flight,
        }
    }

    /// Start with `filter` instead of the default filter.
    pub fn with_filter(self, filter: Filter) -> Self {
        self.state().filter = filter;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn frontend(&self) -> &U {
        &self.ui
    }

    pub fn filter(&self) -> Filter {
        self.state().filter.clone()
    }

    pub fn current_pair(&self) -> Option<ComparisonPair> {
        self.state().pair.clone()
    }

    /// The terminal event waiting to be acknowledged, if any.
    pub fn pending_terminal(&self) -> Option<TerminalEvent> {
        self.state().terminal.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn state(&self) -> MutexGuard<'_, State<G>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invalidate every outstanding read and return the new generation.
    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn check_generation(&self, generation: u64) -> Result<()> {
        let current = self.generation();
        if current != generation {
            tracing::debug!(generation, current, "discarding stale response");
            return Err(Error::StaleResponse);
        }
        Ok(())
    }
}

impl<R, U, S, G> Session<R, U, S, G>
where
    R: EntityRepository,
    U: Frontend,
    S: StatsCollector,
    G: Rng,
{
    pub fn mode(&self) -> Mode {
        self.state().matchmaker.mode()
    }

    pub fn run(&self) -> RunState {
        self.state().matchmaker.run().clone()
    }

    /// Load and show a new pair. Also serves as the retry after a failed load.
    #[instrument(skip(self))]
    pub async fn next_pair(&self) -> Result<()> {
        if self.state().terminal.is_some() {
            return Err(Error::AwaitingAcknowledgement);
        }
        self.load_pair(self.generation()).await
    }

    /// Switch comparison modes. Any run in progress is abandoned; re-selecting the active mode does
    /// nothing.
    #[instrument(skip(self))]
    pub async fn set_mode(&self, mode: Mode) -> Result<()> {
        let generation = {
            let mut state = self.state();
            if !state.matchmaker.set_mode(mode) {
                tracing::debug!("mode unchanged");
                return Ok(());
            }
            state.pair = None;
            state.terminal = None;
            self.bump()
        };
        tracing::info!("mode changed");
        self.load_pair(generation).await
    }

    /// Replace the filter. Any run in progress is abandoned, since the ranking it was based on no
    /// longer applies.
    #[instrument(skip(self))]
    pub async fn apply_filter(&self, filter: Filter) -> Result<()> {
        let generation = {
            let mut state = self.state();
            state.matchmaker.reset();
            state.filter = filter;
            state.pair = None;
            state.terminal = None;
            self.bump()
        };
        self.load_pair(generation).await
    }

    pub async fn reset_filter(&self) -> Result<()> {
        self.apply_filter(Filter::default()).await
    }

    /// Show a different pair without deciding the current one. Only possible outside a run.
    #[instrument(skip(self))]
    pub async fn skip(&self) -> Result<()> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("ignoring skip, another choice is in flight");
            return Err(Error::Reentrant);
        };
        {
            let mut state = self.state();
            if state.terminal.is_some() {
                return Err(Error::AwaitingAcknowledgement);
            }
            if state.matchmaker.run_active() {
                return Err(Error::SkipDuringRun);
            }
            state.pair = None;
        }
        self.load_pair(self.generation()).await
    }

    /// Record that `winner` beat the other entity of the current pair, then move on.
    #[instrument(skip(self))]
    pub async fn pick_winner(&self, winner: &EntityId) -> Result<()> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("ignoring pick, another choice is in flight");
            return Err(Error::Reentrant);
        };
        let generation = self.generation();

        let (mode, pair, winner_role, loser_role, w) = {
            let mut state = self.state();
            if state.terminal.is_some() {
                return Err(Error::AwaitingAcknowledgement);
            }
            let pair = state.pair.as_ref().ok_or(Error::NoPair)?;
            let w = pair
                .position(winner)
                .ok_or_else(|| Error::NotInPair(winner.clone()))?;
            let pair = state.pair.take().ok_or(Error::NoPair)?;
            let matchmaker = &state.matchmaker;
            let winner_role = matchmaker.role(&pair.entities[w].id);
            let loser_role = matchmaker.role(&pair.entities[1 - w].id);
            (matchmaker.mode(), pair, winner_role, loser_role, w)
        };
        let (winner, loser) = (&pair.entities[w], &pair.entities[1 - w]);
        let loser_rank = pair.ranks[1 - w];

        let reporter = self.reporter();
        let outcome = reporter
            .report(&MatchResult {
                mode,
                winner,
                loser,
                winner_role,
                loser_role,
                loser_rank,
            })
            .await;
        tracing::info!(
            %winner.id,
            %loser.id,
            winner_rating = outcome.winner.new,
            loser_rating = outcome.loser.new,
            "pick recorded"
        );

        // The ratings are written either way, but a run that was abandoned while we were writing
        // must not be advanced.
        self.check_generation(generation)?;
        let transition = self
            .state()
            .matchmaker
            .record(winner, loser, loser_rank, &outcome);
        match transition {
            Transition::Continue => {}
            Transition::Relocated { entity, rating } => reporter.place(&entity, rating).await,
            Transition::Terminal(event) => return self.end_run(event).await,
        }
        self.load_pair(generation).await
    }

    /// Dismiss the terminal screen, reset the run and start over with a fresh pair.
    #[instrument(skip(self))]
    pub async fn acknowledge(&self) -> Result<()> {
        let generation = {
            let mut state = self.state();
            if state.terminal.take().is_none() {
                return Ok(());
            }
            state.matchmaker.reset();
            self.bump()
        };
        self.load_pair(generation).await
    }

    fn reporter(&self) -> Reporter<'_, R, S> {
        Reporter::new(&self.repo, &self.stats, self.elo)
    }

    async fn load_pair(&self, generation: u64) -> Result<()> {
        let (mode, filter, limit) = {
            let state = self.state();
            let matchmaker = &state.matchmaker;
            (
                matchmaker.mode(),
                state.filter.clone(),
                matchmaker.config().ranked_pool_limit,
            )
        };

        let pool = self.fetch(mode, &filter, limit).await;
        self.check_generation(generation)?;
        let pool = match pool {
            Ok(pool) => pool,
            Err(err) => {
                tracing::warn!("error loading pool: {err:#}");
                let err = Error::Repository(err);
                self.ui.on_repository_error(&err.to_string());
                return Err(err);
            }
        };

        let (selection, status) = {
            let mut state = self.state();
            let selection = state.matchmaker.select(pool);
            state.pair = match &selection {
                Ok(Selection::Pair(pair)) => Some(pair.clone()),
                _ => None,
            };
            (selection, state.matchmaker.status())
        };
        match selection {
            Ok(Selection::Pair(pair)) => {
                tracing::debug!(a = %pair.entities[0].id, b = %pair.entities[1].id, "pair ready");
                self.ui.on_pair_ready(&pair, status.as_ref());
                Ok(())
            }
            Ok(Selection::Terminal(event)) => self.end_run(event).await,
            Err(err) => {
                if let Error::PoolTooSmall { .. } = err {
                    self.ui.on_pool_too_small_error(&err.to_string());
                }
                Err(err)
            }
        }
    }

    async fn fetch(&self, mode: Mode, filter: &Filter, limit: Option<usize>) -> anyhow::Result<Pool> {
        if let (Mode::Swiss, Some(limit)) = (mode, limit) {
            let count = self.repo.count(filter).await?;
            if count > limit {
                tracing::debug!(count, limit, "pool too large to rank, sampling");
                return Ok(Pool::Sample(self.repo.list_random_sample(filter, 2).await?));
            }
        }
        Ok(Pool::Ranked(self.repo.list_sorted(filter, None).await?))
    }

    async fn end_run(&self, event: TerminalEvent) -> Result<()> {
        self.state().terminal = Some(event.clone());
        if event.kind == TerminalKind::Placement {
            self.reporter().place(&event.entity.id, event.rating).await;
        }
        tracing::info!(kind = %event.kind, id = %event.entity.id, rank = event.rank, "run over");
        self.ui.on_terminal_event(&event);
        Ok(())
    }
}

/// Marks a pick or skip as in progress for as long as it is alive.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
