use clap::{Parser, Subcommand};
use danmaku_resolver::model::{Comment, Episode, Season};
use danmaku_resolver::{
    DanmakuService, FetchOptions, MatchEpisodeInput, MatchEpisodeResult, ResolvedEpisode,
    Settings, open_service,
};
use dialoguer::Select;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "danmaku-resolver")]
#[command(about = "Find the danmaku comments for whatever is playing", long_about = None)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Match an observed title to an episode
    Match {
        /// Title as observed on the page
        title: String,

        /// Episode number to resolve
        #[arg(short, long)]
        episode: Option<u32>,

        /// Original (file-name style) title, used for local matching
        #[arg(long)]
        original_title: Option<String>,

        /// Integration the title was observed on
        #[arg(short, long)]
        integration: Option<String>,

        /// Use this season instead of looking one up
        #[arg(short, long)]
        season_id: Option<u64>,

        /// Download the comments of the matched episode
        #[arg(long)]
        fetch: bool,

        /// With --fetch, download even if comments are already stored
        #[arg(long, requires = "fetch")]
        force: bool,
    },

    /// Search a provider for seasons
    Search {
        /// Provider config id
        provider: String,

        keyword: String,
    },

    /// List the episodes of a stored season
    Episodes { season_id: u64 },

    /// Resolve a direct episode URL
    ParseUrl {
        url: String,

        /// Download the comments of the episode
        #[arg(long)]
        fetch: bool,
    },

    /// Import comments from a JSON file for local matching
    ImportLocal {
        file: PathBuf,

        /// Title to store the comments under (defaults to the file name)
        #[arg(short, long)]
        title: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let mut clog = colog::default_builder();
    clog.filter(None, level);
    clog.init();
}

fn season_label(season: &Season) -> String {
    let mut label = format!("[{}] {}", season.provider_config_id, season.title);
    if let Some(year) = season.year {
        label.push_str(&format!(" ({})", year));
    }
    if let Some(count) = season.episode_count {
        label.push_str(&format!(", {} episode(s)", count));
    }
    label
}

fn print_fetched(episode: &Episode) {
    println!(
        "  Comments: {} (version {}, checked {})",
        episode.comment_count,
        episode.version,
        episode.last_checked.format("%Y-%m-%d %H:%M:%S")
    );
}

fn run_match(
    service: &DanmakuService,
    mut input: MatchEpisodeInput,
    fetch: Option<FetchOptions>,
) -> Result<(), Box<dyn Error>> {
    loop {
        match service.find_matching_episodes(&input)? {
            MatchEpisodeResult::Success { episode, metadata } => {
                println!("Matched with {} strategy", metadata.strategy);
                match episode {
                    ResolvedEpisode::Provider(target) => {
                        println!("  Season: {}", season_label(&target.season));
                        println!("  Episode: {}", target.episode.title);
                        if let Some(options) = fetch {
                            print_fetched(&service.fetch_danmaku(&target, options)?);
                        }
                    }
                    ResolvedEpisode::Local(local) => {
                        println!("  Local episode: {}", local.title);
                        println!("  Comments: {}", local.comment_count);
                    }
                }
                return Ok(());
            }
            MatchEpisodeResult::NotFound { cause } => {
                println!(
                    "No episode found: {}",
                    cause.as_deref().unwrap_or("no cause given")
                );
                return Ok(());
            }
            MatchEpisodeResult::Disambiguation { candidates } => {
                let labels: Vec<String> = candidates.iter().map(season_label).collect();
                let choice = Select::new()
                    .with_prompt(format!("Which season is '{}'?", input.title))
                    .items(&labels)
                    .default(0)
                    .interact_opt()?;

                let Some(index) = choice else {
                    println!("No season selected.");
                    return Ok(());
                };
                input = input.with_season_id(candidates[index].id);
            }
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };
    let service = open_service(&settings)?;

    match cli.command {
        Command::Match {
            title,
            episode,
            original_title,
            integration,
            season_id,
            fetch,
            force,
        } => {
            let mut input = MatchEpisodeInput::new(title, integration.as_deref());
            input.episode_number = episode;
            input.original_title = original_title;
            input.season_id = season_id;

            let fetch = fetch.then_some(FetchOptions {
                force_update: force,
            });
            run_match(&service, input, fetch)
        }
        Command::Search { provider, keyword } => {
            let seasons = service.search_seasons(&provider, &keyword)?;
            if seasons.is_empty() {
                println!("No seasons found.");
            }
            for season in seasons {
                println!("{:>6}  {}", season.id, season_label(&season));
            }
            Ok(())
        }
        Command::Episodes { season_id } => {
            for (index, episode) in service.get_episodes(season_id)?.iter().enumerate() {
                let number = episode
                    .episode_number
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("#{}", index + 1));
                println!("{:>5}  {}", number, episode.title);
            }
            Ok(())
        }
        Command::ParseUrl { url, fetch } => {
            let Some(target) = service.parse_url(&url)? else {
                println!("No provider understands {}", url);
                return Ok(());
            };
            println!("  Season: {}", season_label(&target.season));
            println!("  Episode: {}", target.episode.title);
            if fetch {
                print_fetched(&service.fetch_danmaku(&target, FetchOptions::default())?);
            }
            Ok(())
        }
        Command::ImportLocal { file, title } => {
            let comments: Vec<Comment> = serde_json::from_str(&fs::read_to_string(&file)?)?;
            let title = match title {
                Some(title) => title,
                None => file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or("file has no name")?,
            };
            let episode = service.import_local(&title, comments)?;
            println!(
                "Imported {} comment(s) as '{}'",
                episode.comment_count, episode.title
            );
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
