use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pacman_q_core::{
    Position,
    agent::QAgent,
    config::GameConfig,
    environment::{EpisodeStatus, Observation},
    ghost::Ghost,
    map::Tile,
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Preset {
    /// Classic maze, a direct chaser and a flanker
    Default,
    /// Classic maze with four ghosts
    FourGhosts,
    /// Small maze, one ghost, captures reset the agent
    SingleGhost,
}

#[derive(Parser, Debug)]
#[command(version, about = "Tabular Q-learning agent playing a Pac-Man style maze", long_about = None)]
struct Args {
    /// JSON game configuration; overrides --preset
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Built-in configuration to use when no config file is given
    #[arg(short, long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,

    /// File the Q-table and score history are loaded from and saved to
    #[arg(short, long, value_name = "FILE", default_value = "pacman.qtable")]
    qtable: PathBuf,

    /// Write logs to this file (RUST_LOG controls the filter)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Train headless for this many episodes instead of opening the UI
    #[arg(short, long, value_name = "EPISODES")]
    train: Option<usize>,

    /// Step cap per episode
    #[arg(long, default_value_t = 2_000)]
    max_steps: usize,

    /// Seed for every random draw
    #[arg(long)]
    seed: Option<u64>,
}

const MIN_TICK: Duration = Duration::from_millis(10);
const MAX_TICK: Duration = Duration::from_millis(1_000);

struct App {
    /// The learner and the environment it plays.
    agent: QAgent,
    max_steps: usize,
    tick_rate: Duration,
    paused: bool,
    /// Last notable event, shown in the status panel.
    message: String,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(agent: QAgent, max_steps: usize) -> Self {
        App {
            agent,
            max_steps,
            tick_rate: Duration::from_millis(100),
            paused: false,
            message: String::new(),
            should_quit: false,
        }
    }

    /// Plays one tick, starting a new episode once the current one is over.
    fn tick(&mut self) {
        if self.paused {
            return;
        }
        let status = self.agent.environment().status();
        if status != EpisodeStatus::Playing || self.agent.episode_steps() >= self.max_steps {
            self.message = format!("{status:?} with score {:.0}", self.agent.score());
            self.agent.reset();
            return;
        }
        self.agent.step(None);
    }

    fn faster(&mut self) {
        self.tick_rate = (self.tick_rate / 2).max(MIN_TICK);
    }

    fn slower(&mut self) {
        self.tick_rate = (self.tick_rate * 2).min(MAX_TICK);
    }

    fn save(&mut self, path: &Path) {
        self.message = match self.agent.save(path) {
            Ok(()) => format!("Saved to {}", path.display()),
            Err(err) => {
                error!(%err, "save failed");
                format!("Save failed: {err}")
            }
        };
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    if let Some(path) = &args.log_file {
        init_logging(path)?;
    }

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => match args.preset {
            Preset::Default => GameConfig::default(),
            Preset::FourGhosts => GameConfig::four_ghosts(),
            Preset::SingleGhost => GameConfig::single_ghost(),
        },
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let mut agent = QAgent::new(&config).context("Invalid game configuration")?;
    let loaded = agent
        .load(&args.qtable)
        .with_context(|| format!("Failed to load {}", args.qtable.display()))?;
    info!(loaded, states = agent.qtable().len(), "agent ready");

    if let Some(episodes) = args.train {
        train(&mut agent, episodes, args.max_steps);
        agent
            .save(&args.qtable)
            .with_context(|| format!("Failed to save {}", args.qtable.display()))?;
        return Ok(());
    }

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    let mut app = App::new(agent, args.max_steps);
    if loaded {
        app.message = format!("Loaded {}", args.qtable.display());
    }

    // Run the main application loop, restoring the terminal even if it fails
    let result = run_app(&mut terminal, &mut app, &args.qtable);
    restore_terminal(&mut terminal)?;
    result?;

    app.agent
        .save(&args.qtable)
        .with_context(|| format!("Failed to save {}", args.qtable.display()))?;
    Ok(())
}

/// Installs a file-backed subscriber so logging never draws over the UI.
fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_config(path: &Path) -> Result<GameConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Runs `episodes` capped episodes without rendering and prints a summary.
fn train(agent: &mut QAgent, episodes: usize, max_steps: usize) {
    let (mut won, mut lost, mut capped) = (0usize, 0usize, 0usize);
    let mut total = 0.0;
    let mut best = f64::NEG_INFINITY;
    let report_every = (episodes / 10).max(1);

    for episode in 1..=episodes {
        let summary = agent.run_episode(max_steps);
        match summary.status {
            EpisodeStatus::Won => won += 1,
            EpisodeStatus::Lost => lost += 1,
            EpisodeStatus::Playing => capped += 1,
        }
        total += summary.score;
        best = best.max(summary.score);
        agent.reset();

        if episode % report_every == 0 {
            info!(episode, score = summary.score, exploration = agent.exploration(), "training");
            println!(
                "episode {episode:>7}  score {:>10.1}  exploration {:.4}  states {}",
                summary.score,
                agent.exploration(),
                agent.qtable().len()
            );
        }
    }

    if episodes > 0 {
        println!(
            "trained {episodes} episodes: {won} won, {lost} lost, {capped} capped, mean score {:.1}, best {:.1}",
            total / episodes as f64,
            best
        );
    }
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    qtable: &Path,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = app
            .tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char(' ') => app.paused = !app.paused,
                    KeyCode::Char('r') => {
                        app.agent.reset();
                        app.message = "Episode reset".to_string();
                    }
                    KeyCode::Char('e') => {
                        app.agent.shake(None);
                        app.message = "Exploring".to_string();
                    }
                    KeyCode::Char('d') => {
                        app.agent.exploit();
                        app.message = "Exploiting".to_string();
                    }
                    KeyCode::Char('s') => app.save(qtable),
                    KeyCode::Char('+') => app.faster(),
                    KeyCode::Char('-') => app.slower(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= app.tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),    // Maze
            Constraint::Length(9), // Stats and score history
            Constraint::Length(2), // Help
        ])
        .split(frame.area());
    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(main_layout[1]);

    let observation = app.agent.observe();
    render_map(frame, main_layout[0], &observation);
    render_stats(frame, bottom[0], app, &observation);
    render_history(frame, bottom[1], app.agent.history());

    let help_text = Paragraph::new(
        "q/Esc quit | space pause | r reset | e explore | d exploit | s save | +/- speed",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn ghost_color(index: usize) -> Color {
    match index % 4 {
        0 => Color::Red,
        1 => Color::Magenta,
        2 => Color::Cyan,
        _ => Color::LightRed,
    }
}

fn ghost_span(index: usize, ghost: &Ghost, frightened: bool) -> Span<'static> {
    let style = match (frightened, ghost.eaten) {
        (true, true) => Style::default().fg(Color::DarkGray),
        (true, false) => Style::default().fg(Color::Blue).bold(),
        (false, _) => Style::default().fg(ghost_color(index)).bold(),
    };
    Span::styled("M", style)
}

/// Renders the maze with the agent and ghosts on top.
fn render_map(frame: &mut Frame, area: Rect, observation: &Observation) {
    let maze = observation.maze;
    let frightened = observation.frightened_ticks > 0;
    let mut lines: Vec<Line> = Vec::with_capacity(maze.height());

    for row in 0..maze.height() as isize {
        let mut spans: Vec<Span> = Vec::with_capacity(maze.width());
        for col in 0..maze.width() as isize {
            let pos = Position::new(row, col);
            let ghost = observation
                .ghosts
                .iter()
                .enumerate()
                .find(|(_, ghost)| ghost.position == pos);

            let span = if pos == observation.agent {
                Span::styled("C", Style::default().fg(Color::Yellow).bold())
            } else if let Some((index, ghost)) = ghost {
                ghost_span(index, ghost, frightened)
            } else {
                match maze.tile_at(pos) {
                    Tile::Wall => Span::styled("#", Style::default().fg(Color::DarkGray)),
                    Tile::Pellet => Span::styled(".", Style::default().fg(Color::White)),
                    Tile::PowerPellet => Span::styled("o", Style::default().fg(Color::LightYellow)),
                    Tile::Empty | Tile::OutOfBounds => Span::raw(" "),
                }
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Pac-Man Q").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// Renders the episode counters and learner state.
fn render_stats(frame: &mut Frame, area: Rect, app: &App, observation: &Observation) {
    let agent = &app.agent;
    let mut items = vec![
        ListItem::new(format!(
            "Episode: {}  Score: {:.0}  Status: {:?}",
            agent.history().len() + 1,
            observation.score,
            observation.status
        )),
        ListItem::new(format!(
            "Steps: {}  Pellets left: {}",
            agent.episode_steps(),
            observation.pellets.len()
        )),
        ListItem::new(format!(
            "Exploration: {:.4}  States learned: {}",
            agent.exploration(),
            agent.qtable().len()
        )),
        ListItem::new(format!(
            "Tick: {} ms{}",
            app.tick_rate.as_millis(),
            if app.paused { "  [paused]" } else { "" }
        )),
    ];
    if observation.frightened_ticks > 0 {
        items.push(ListItem::new(Span::styled(
            format!("Frightened: {}", observation.frightened_ticks),
            Style::default().fg(Color::Blue),
        )));
    }
    if !app.message.is_empty() {
        items.push(ListItem::new(app.message.as_str()));
    }

    let stats = List::new(items).block(Block::default().borders(Borders::ALL).title("Agent"));
    frame.render_widget(stats, area);
}

/// Renders recent episode scores, shifted so the lowest one sits at zero.
fn render_history(frame: &mut Frame, area: Rect, history: &[f64]) {
    let width = area.width.saturating_sub(2) as usize;
    let recent = &history[history.len().saturating_sub(width)..];
    let floor = recent.iter().copied().fold(f64::INFINITY, f64::min);
    let data: Vec<u64> = recent.iter().map(|score| (score - floor) as u64).collect();

    let title = match history.last() {
        Some(last) => format!("Scores (last {last:.0})"),
        None => "Scores".to_string(),
    };
    let sparkline = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .data(&data)
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(sparkline, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_config_is_valid() {
        let config: GameConfig = serde_json::from_str(include_str!("../../maps/cross.json")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.ghosts.len(), 2);
        assert!(config.loop_escape.is_some());
        assert_eq!(config.start, None);

        let agent = QAgent::new(&config).unwrap();
        assert_eq!(agent.position(), Position::new(3, 4));
        assert_eq!(agent.environment().start(), Position::new(3, 4));
    }

    #[test]
    fn test_presets_roundtrip_through_json() {
        for config in [
            GameConfig::default(),
            GameConfig::four_ghosts(),
            GameConfig::single_ghost(),
        ] {
            let json = serde_json::to_string_pretty(&config).unwrap();
            let parsed: GameConfig = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed.maze, config.maze);
            assert_eq!(parsed.ghosts, config.ghosts);
            assert_eq!(parsed.capture, config.capture);
            assert_eq!(parsed.features, config.features);
            parsed.validate().unwrap();
        }
    }

    #[test]
    fn test_app_resets_after_step_cap() {
        let config = GameConfig {
            seed: Some(3),
            ..GameConfig::single_ghost()
        };
        let mut app = App::new(QAgent::new(&config).unwrap(), 4);
        for _ in 0..4 {
            app.tick();
        }
        assert_eq!(app.agent.episode_steps(), 4);
        app.tick();
        assert_eq!(app.agent.episode_steps(), 0);
        assert_eq!(app.agent.history().len(), 1);

        app.paused = true;
        app.tick();
        assert_eq!(app.agent.episode_steps(), 0);
    }
}
