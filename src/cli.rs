use std::cmp;
use std::error::Error;
use std::path::PathBuf;

use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use theoremdex::app::{SearchSession, finish_render};
use theoremdex::dom::Document;
use theoremdex::render::{self, UnicodeTypesetter, build_cards};
use theoremdex::segment::{self, Segment};
use theoremdex::{Catalog, Entry, TokenPatterns, Typesetter, normalize, rank_scored};

#[derive(Parser, Debug)]
#[command(name = "theoremdex", about = "Search the theorem-card catalog", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Load the catalog from this file instead of the embedded dataset.
    #[arg(long, global = true, value_name = "PATH")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank cards against a query and render them with highlighting.
    Search {
        /// Query words; joined with spaces before tokenization.
        #[arg(required = true)]
        query: Vec<String>,
        /// Maximum number of cards to render.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Skip math typesetting and leave notation source in place.
        #[arg(long)]
        plain: bool,
    },
    /// Show the full card for one theorem title.
    Show {
        /// Exact title (case-insensitive).
        title: String,
    },
    /// List every card in the catalog.
    List,
    /// Serve the catalog over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    theoremdex::telemetry::init();
    let catalog = Catalog::load_or_empty(cli.catalog.as_deref());
    match cli.command {
        Command::Search {
            query,
            limit,
            plain,
        } => handle_search(&catalog, &query.join(" "), limit, plain, cli.json),
        Command::Show { title } => handle_show(&catalog, &title, cli.json),
        Command::List => handle_list(&catalog, cli.json),
        #[cfg(feature = "web")]
        Command::Serve { addr } => handle_serve(catalog, addr),
    }
}

fn handle_search(
    catalog: &Catalog,
    query: &str,
    limit: usize,
    plain: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let limit = cmp::max(1, limit);

    if as_json {
        let tokens = normalize(query);
        let ranked = rank_scored(catalog.entries(), &tokens);
        let payload = json!({
            "query": query,
            "tokens": tokens,
            "results": ranked.iter().take(limit).map(|scored| {
                json!({
                    "title": scored.entry.title,
                    "tags": scored.entry.tags,
                    "link": scored.entry.link,
                    "score": scored.score,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(async {
        let engine = UnicodeTypesetter;
        let typesetter: Option<&dyn Typesetter> = if plain { None } else { Some(&engine) };
        let mut session = SearchSession::new(catalog, typesetter);
        session.search(query);

        if session.results().is_empty() {
            println!("No cards matched \"{query}\".");
            return;
        }

        let shown = &session.results()[..cmp::min(limit, session.results().len())];
        let patterns = TokenPatterns::compile(session.tokens());
        let mut doc = Document::new();
        let root = build_cards(&mut doc, shown, &patterns);
        finish_render(&mut doc, root, &patterns, typesetter, &session.ticket()).await;
        print!("{}", render_cards_ansi(&doc, root, stdout_is_tty()));
        if session.results().len() > shown.len() {
            println!(
                "({} more match{}; raise --limit to see them)",
                session.results().len() - shown.len(),
                if session.results().len() - shown.len() == 1 { "" } else { "es" }
            );
        }
    });
    Ok(())
}

fn handle_show(catalog: &Catalog, title: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let entry = catalog
        .by_title(title)
        .ok_or_else(|| format!("No card found for title {title:?}"))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(entry)?);
        return Ok(());
    }
    print_entry(entry);
    Ok(())
}

fn handle_list(catalog: &Catalog, as_json: bool) -> Result<(), Box<dyn Error>> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(catalog.entries())?);
        return Ok(());
    }
    print_list_table(catalog.entries());
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(catalog: Catalog, addr: std::net::SocketAddr) -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let config = theoremdex::web::WebConfig {
        addr,
        ..Default::default()
    };
    runtime.block_on(theoremdex::web::serve(config, catalog))?;
    Ok(())
}

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const MARK: &str = "\x1b[1;33m";
const RESET: &str = "\x1b[0m";

/// Flattens the rendered card tree to terminal output. Highlight markers
/// turn bold yellow on a tty and are left unmarked otherwise.
fn render_cards_ansi(doc: &Document, grid: usize, color: bool) -> String {
    let mut out = String::new();
    for &card in doc.children(grid) {
        for &part in doc.children(card) {
            match doc.tag(part) {
                Some("h3") => {
                    if color {
                        out.push_str(BOLD);
                    }
                    out.push_str(&inline_text(doc, part, color));
                    if color {
                        out.push_str(RESET);
                    }
                    out.push('\n');
                }
                Some("p") => {
                    out.push_str("  ");
                    out.push_str(&inline_text(doc, part, color));
                    out.push('\n');
                }
                Some("div") => {
                    let chips: Vec<String> = doc
                        .children(part)
                        .iter()
                        .map(|&chip| format!("[{}]", inline_text(doc, chip, color)))
                        .collect();
                    if !chips.is_empty() {
                        out.push_str("  ");
                        out.push_str(&chips.join(" "));
                        out.push('\n');
                    }
                }
                Some("a") => {
                    let href = doc.attr(part, "href").unwrap_or_default();
                    if color {
                        out.push_str(&format!("  {DIM}→ {href}{RESET}\n"));
                    } else {
                        out.push_str(&format!("  → {href}\n"));
                    }
                }
                _ => {}
            }
        }
        out.push('\n');
    }
    out
}

/// Inline text of a node with highlight markers styled.
fn inline_text(doc: &Document, node: usize, color: bool) -> String {
    let mut out = String::new();
    inline_text_into(doc, node, color, &mut out);
    out
}

fn inline_text_into(doc: &Document, node: usize, color: bool, out: &mut String) {
    if let Some(text) = doc.text(node) {
        out.push_str(text);
        return;
    }
    let marked = color && doc.tag(node) == Some(theoremdex::highlight::MARK_TAG);
    if marked {
        out.push_str(MARK);
    }
    for &child in doc.children(node) {
        inline_text_into(doc, child, color, out);
    }
    if marked {
        out.push_str(RESET);
    }
}

/// String-level typesetting for the single-card view: math segments become
/// Unicode, literal text passes through.
fn typeset_plain(text: &str) -> String {
    segment::split(text)
        .iter()
        .map(|piece| match piece {
            Segment::Math(content) => render::render_math(content),
            Segment::Text(content) => content.clone(),
        })
        .collect()
}

fn print_entry(entry: &Entry) {
    println!("Theorem: {}", entry.title);
    if !entry.tags.is_empty() {
        println!("Tags: {}", entry.tags.join(", "));
    }
    println!("Link: {}", entry.link);
    render_text_block("Statement", &typeset_plain(&entry.description));
}

fn print_list_table(entries: &[Entry]) {
    if entries.is_empty() {
        println!("The catalog is empty.");
        return;
    }
    let width = entries
        .iter()
        .map(|entry| entry.title.len())
        .max()
        .unwrap_or(5)
        .max("TITLE".len());
    println!("{:<width$}  {}", "TITLE", "TAGS", width = width);
    println!("{:-<width$}  {}", "", "----", width = width);
    for entry in entries {
        println!(
            "{:<width$}  {}",
            entry.title,
            entry.tags.join(", "),
            width = width
        );
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn block_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_text_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(block_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
