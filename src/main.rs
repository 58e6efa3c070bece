mod app;
mod cli;
mod config;
mod domain;
mod engine;
mod locks;
mod metrics;
mod query;
mod store;
mod ui;

use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        for line in err.report_details() {
            eprintln!("  {line}");
        }
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

fn init_logging(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<(), app::AppError> {
    use clap::Parser;
    use cli::Commands;

    let cli = cli::Cli::parse();
    init_logging(&cli.log_level);

    let config = config::Config::load(cli.config.as_deref())?;
    if let Commands::Policy(args) = &cli.command {
        if args.json {
            print_json(&config);
        } else {
            ui::print_policy(&config.engine_options());
        }
        return Ok(());
    }

    let app = app::App::open(&cli.db, cli.lock_file, &config)?;

    match cli.command {
        Commands::Add(args) => {
            for word in &args.words {
                let outcome = app.add_word(word)?;
                if args.json {
                    print_json(&outcome);
                } else {
                    ui::print_append(&outcome);
                }
            }
            if args.stats {
                let counters = app.counters();
                if args.json {
                    print_json(&counters);
                } else {
                    ui::print_counters(&counters);
                }
            }
        }
        Commands::Ls(args) => {
            let page = app.list_stories(args.limit, args.offset)?;
            if args.json {
                print_json(&page);
            } else {
                ui::print_story_page(&page);
            }
        }
        Commands::Show(args) => {
            let detail = app.show_story(args.id)?;
            if args.json {
                print_json(&detail);
            } else {
                ui::print_story_detail(&detail);
            }
        }
        Commands::Status(args) => {
            let open = app.open_story()?;
            if args.json {
                print_json(&open);
            } else {
                ui::print_status(open.as_ref());
            }
        }
        Commands::Policy(_) => {
            ui::print_policy(app.options());
        }
    }
    Ok(())
}
