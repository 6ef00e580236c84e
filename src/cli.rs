use std::error::Error;
use std::time::Duration;

use atty::Stream;
use clap::{Parser, Subcommand};
use pokedex_rs::client::{CatalogClient, ClientConfig, DEFAULT_API_BASE, DEFAULT_LISTING_LIMIT};
use pokedex_rs::view::DEFAULT_ITEMS_PER_PAGE;
use pokedex_rs::{Catalog, PageResetPolicy, PageView, ViewConfig, ViewState, debounce};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pokedex-rs", about = "Browse the PokeAPI catalog", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the upstream API.
    #[arg(long, global = true, default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Number of entities requested from the collection listing.
    #[arg(long, global = true, default_value_t = DEFAULT_LISTING_LIMIT)]
    limit: usize,

    /// Upstream request timeout in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the catalog and print one page of it.
    List {
        /// Case-insensitive substring to match against names.
        #[arg(short, long, default_value = "")]
        search: String,
        /// Only show entities carrying this type.
        #[arg(short, long, default_value = "")]
        tag: String,
        /// Page to show, clamped to the available range.
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        /// Entities per page.
        #[arg(long, default_value_t = DEFAULT_ITEMS_PER_PAGE)]
        per_page: usize,
    },
    /// Print the type vocabulary.
    Tags,
    /// Interactive session: type to search, `:help` for commands.
    Browse {
        /// Entities per page.
        #[arg(long, default_value_t = DEFAULT_ITEMS_PER_PAGE)]
        per_page: usize,
        /// Quiet period before a search is applied, in milliseconds.
        #[arg(long, default_value_t = 500)]
        debounce_ms: u64,
        /// Keep the current page when the search or type changes.
        #[arg(long)]
        keep_page: bool,
    },
    /// Serve the catalog viewer over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        /// Public base URL used in canonical links.
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        base_url: String,
        /// Entities per page.
        #[arg(long, default_value_t = DEFAULT_ITEMS_PER_PAGE)]
        per_page: usize,
    },
}

impl Command {
    fn default_log_filter(&self) -> &'static str {
        match self {
            #[cfg(feature = "web")]
            Command::Serve { .. } => "info",
            _ => "warn",
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.command.default_log_filter());
    let config = ClientConfig {
        base_url: cli.api_base.clone(),
        listing_limit: cli.limit.max(1),
        timeout: Duration::from_secs(cli.timeout_secs.max(1)),
        ..ClientConfig::default()
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    match cli.command {
        Command::List {
            search,
            tag,
            page,
            per_page,
        } => runtime.block_on(handle_list(config, search, tag, page, per_page, cli.json)),
        Command::Tags => runtime.block_on(handle_tags(config, cli.json)),
        Command::Browse {
            per_page,
            debounce_ms,
            keep_page,
        } => {
            let view = ViewConfig {
                items_per_page: per_page.max(1),
                debounce: Duration::from_millis(debounce_ms),
                reset_policy: if keep_page {
                    PageResetPolicy::Preserve
                } else {
                    PageResetPolicy::ResetOnFilterChange
                },
            };
            runtime.block_on(handle_browse(config, view))
        }
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            base_url,
            per_page,
        } => {
            let web = pokedex_rs::web::WebConfig {
                addr,
                base_url,
                client: config,
                view: ViewConfig {
                    items_per_page: per_page.max(1),
                    ..ViewConfig::default()
                },
            };
            runtime.block_on(pokedex_rs::web::serve(web))?;
            Ok(())
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn load(config: &ClientConfig) -> Result<Catalog, Box<dyn Error>> {
    let client = CatalogClient::from_config(config)?;
    client
        .load_catalog()
        .await
        .map_err(|err| format!("{}: {err}", err.user_message()).into())
}

async fn handle_list(
    config: ClientConfig,
    search: String,
    tag: String,
    page: usize,
    per_page: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let catalog = load(&config).await?;
    let state = ViewState::new(per_page)
        .set_search_term(search.trim())
        .set_debounced_term(search.trim())
        .set_tag(tag);
    let total = catalog.view(&state).total_pages;
    let state = state.go_to_page(page, total);
    let view = catalog.view(&state);

    if as_json {
        let mut payload = serde_json::to_value(view.to_payload())?;
        if let Some(warning) = catalog.tag_warning() {
            payload["warning"] = json!(warning);
        }
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        if let Some(warning) = catalog.tag_warning() {
            println!("warning: {warning}");
        }
        print_page(&view);
    }
    Ok(())
}

async fn handle_tags(config: ClientConfig, as_json: bool) -> Result<(), Box<dyn Error>> {
    let client = CatalogClient::from_config(&config)?;
    let tags = client
        .load_tags()
        .await
        .map_err(|err| format!("{}: {err}", err.user_message()))?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({ "tags": tags }))?);
    } else if tags.is_empty() {
        println!("No types available.");
    } else {
        for tag in &tags {
            println!("{tag}");
        }
    }
    Ok(())
}

/// Parsed line of interactive input.
#[derive(Debug, PartialEq, Eq)]
enum BrowseInput {
    Search(String),
    Tag(String),
    AllTags,
    ListTags,
    Next,
    Previous,
    Help,
    Quit,
    Unknown(String),
}

fn parse_browse_line(line: &str) -> BrowseInput {
    let Some(command) = line.trim().strip_prefix(':') else {
        return BrowseInput::Search(line.trim().to_string());
    };
    let mut parts = command.trim().splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();
    match head {
        "next" | "n" => BrowseInput::Next,
        "prev" | "p" => BrowseInput::Previous,
        "tag" | "t" if !rest.is_empty() => BrowseInput::Tag(rest.to_string()),
        "all" | "tag" | "t" => BrowseInput::AllTags,
        "tags" => BrowseInput::ListTags,
        "help" | "h" => BrowseInput::Help,
        "quit" | "q" => BrowseInput::Quit,
        other => BrowseInput::Unknown(other.to_string()),
    }
}

const BROWSE_HELP: &str = "Type to search by name. Commands: :next, :prev, :tag NAME, :all, :tags, :help, :quit";

async fn handle_browse(config: ClientConfig, view_config: ViewConfig) -> Result<(), Box<dyn Error>> {
    println!("Loading...");
    let catalog = load(&config).await?;
    if let Some(warning) = catalog.tag_warning() {
        println!("warning: {warning} (type filter disabled)");
    }
    println!("{BROWSE_HELP}");

    let mut state = ViewState::from_config(&view_config);
    render_browse(&catalog, &state);

    let (search_tx, search_rx) = mpsc::channel::<String>(32);
    let (settled_tx, mut settled_rx) = mpsc::channel::<String>(8);
    let debouncer = tokio::spawn(debounce::run(search_rx, settled_tx, view_config.debounce));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_browse_line(&line) {
                    BrowseInput::Search(term) => {
                        state = state.set_search_term(term.clone());
                        if search_tx.send(term).await.is_err() {
                            break;
                        }
                    }
                    BrowseInput::Tag(tag) => {
                        match catalog.tags() {
                            Some(tags) if tags.iter().any(|known| *known == tag) => {
                                state = state.set_tag(tag);
                                render_browse(&catalog, &state);
                            }
                            Some(_) => println!("Unknown type {tag:?}; try :tags"),
                            None => println!("Type filter unavailable."),
                        }
                    }
                    BrowseInput::AllTags => {
                        state = state.set_tag("");
                        render_browse(&catalog, &state);
                    }
                    BrowseInput::ListTags => match catalog.tags() {
                        Some(tags) => println!("All Types, {}", tags.join(", ")),
                        None => println!("Type filter unavailable."),
                    },
                    BrowseInput::Next => {
                        let total = catalog.view(&state).total_pages;
                        state = state.next_page(total);
                        render_browse(&catalog, &state);
                    }
                    BrowseInput::Previous => {
                        state = state.previous_page();
                        render_browse(&catalog, &state);
                    }
                    BrowseInput::Help => println!("{BROWSE_HELP}"),
                    BrowseInput::Quit => break,
                    BrowseInput::Unknown(command) => {
                        println!("Unknown command :{command}. {BROWSE_HELP}")
                    }
                }
            }
            Some(term) = settled_rx.recv() => {
                debug!(term = %term, "search settled");
                state = state.set_debounced_term(term);
                render_browse(&catalog, &state);
            }
        }
    }

    // Closing the input channel cancels any pending search timer.
    drop(search_tx);
    debouncer.await?;
    Ok(())
}

fn render_browse(catalog: &Catalog, state: &ViewState) {
    let view = catalog.view(state);
    let mut heading = format!("Search: {:?}", view.query);
    if let Some(tag) = &view.tag {
        heading.push_str(&format!("  Type: {tag}"));
    }
    println!("\n{heading}");
    print_page(&view);
}

fn print_page(view: &PageView<'_>) {
    if view.is_empty() {
        println!("No Pokémon found.");
    } else if view.items.is_empty() {
        println!("Nothing on this page.");
    } else if stdout_is_tty() {
        let skin = MadSkin::default();
        let table = markdown_table(view);
        println!("{}", FmtText::from(&skin, &table, Some(markdown_width())));
    } else {
        print_plain_table(view);
    }
    println!(
        "{}  ({} match{})  [{}] [{}]",
        view.page_label(),
        view.filtered_count,
        if view.filtered_count == 1 { "" } else { "es" },
        if view.has_previous { "Previous" } else { "-" },
        if view.has_next { "Next" } else { "-" },
    );
}

fn print_plain_table(view: &PageView<'_>) {
    print!("{}", plain_table(view));
}

fn plain_table(view: &PageView<'_>) -> String {
    let rows: Vec<(String, String)> = view
        .items
        .iter()
        .map(|entity| (entity.display_name(), entity.tag_line()))
        .collect();
    let width = rows
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let mut text = format!("{:<width$}  TYPES\n{:-<width$}  -----\n", "NAME", "");
    for (name, tags) in &rows {
        text.push_str(&format!("{name:<width$}  {tags}\n"));
    }
    text
}

fn markdown_table(view: &PageView<'_>) -> String {
    let mut text = String::from("|Name|Types|Image|\n|:-|:-|:-|\n");
    for entity in &view.items {
        text.push_str(&format!(
            "|**{}**|{}|{}|\n",
            entity.display_name(),
            entity.tag_line(),
            entity.image_url().unwrap_or("—"),
        ));
    }
    text
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use pokedex_rs::EntityDetail;

    #[test]
    fn plain_lines_are_search_input() {
        assert_eq!(
            parse_browse_line("  Pika "),
            BrowseInput::Search("Pika".to_string())
        );
        assert_eq!(parse_browse_line(""), BrowseInput::Search(String::new()));
    }

    #[test]
    fn colon_lines_are_commands() {
        assert_eq!(parse_browse_line(":next"), BrowseInput::Next);
        assert_eq!(parse_browse_line(":p"), BrowseInput::Previous);
        assert_eq!(
            parse_browse_line(":tag  poison "),
            BrowseInput::Tag("poison".to_string())
        );
        assert_eq!(parse_browse_line(":tag"), BrowseInput::AllTags);
        assert_eq!(parse_browse_line(":all"), BrowseInput::AllTags);
        assert_eq!(parse_browse_line(":q"), BrowseInput::Quit);
        assert_eq!(
            parse_browse_line(":fly"),
            BrowseInput::Unknown("fly".to_string())
        );
    }

    #[test]
    fn markdown_table_lists_each_card() {
        let entities = vec![
            EntityDetail::new("pikachu", Some("https://img/25.png".to_string()), ["electric"]),
            EntityDetail::new("bulbasaur", None, ["grass", "poison"]),
        ];
        let state = ViewState::new(12);
        let view = state.project(&entities);
        let table = markdown_table(&view);
        assert!(table.contains("|**Pikachu**|electric|https://img/25.png|"));
        assert!(table.contains("|**Bulbasaur**|grass, poison|—|"));
    }

    #[test]
    fn plain_table_aligns_on_printed_names() {
        let entities = vec![
            EntityDetail::new("flabébé", None, ["fairy"]),
            EntityDetail::new("mr-mime", None, ["psychic", "fairy"]),
        ];
        let state = ViewState::new(12);
        let table = plain_table(&state.project(&entities));
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "NAME     TYPES");
        assert_eq!(lines[2], "Flabébé  fairy");
        assert_eq!(lines[1], "-------  -----");
        assert_eq!(lines[3], "Mr-mime  psychic, fairy");
    }
}
