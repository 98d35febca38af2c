//! GPS route reader utility

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gps_route_reader::{
    config::AppConfig, validation::parse_search_args, Database, DateRange, GpsReaderError,
    RouteAnalyzer, SearchFilter, TableName,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Store and analyse GPS routes of a transport company")]
struct Cli {
    /// Company name, selects the `<company>.db` database file
    #[arg(short, long, env = "GPSREADER_COMPANY")]
    company: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the GPS table if it does not exist
    Init,
    /// Show tables, columns and row counts
    Info,
    /// Print matching fixes as JSON lines
    Search(FilterArgs),
    /// List duplicated fixes
    Duplicates,
    /// Remove duplicated fixes, keeping the first stored one
    Dedupe,
    /// Drop the GPS table
    DropTable,
    /// Remove the company database file
    DeleteDatabase,
    /// Print the route summary
    Report(FilterArgs),
    /// Print start, end and border crossing points
    Crossings(FilterArgs),
    /// Write the route map
    Map {
        #[command(flatten)]
        args: FilterArgs,
        /// Add border crossing markers
        #[arg(long)]
        crossings: bool,
        /// Only start, end and border crossing markers
        #[arg(long, conflicts_with = "crossings")]
        only_crossings: bool,
        /// Output file, `.html` or `.geojson`
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Write the distance and speed diagrams as SVG
    Charts(FilterArgs),
}

#[derive(Args, Debug, Clone)]
struct FilterArgs {
    /// Substring of the vehicle registration number
    #[arg(long)]
    vehicle: Option<String>,
    /// Substring of the driver name
    #[arg(long)]
    driver: Option<String>,
    /// First day, `yyyy-mm-dd`
    #[arg(long)]
    from: Option<String>,
    /// Last day, `yyyy-mm-dd`
    #[arg(long)]
    to: Option<String>,
    /// Filter as JSON, e.g. `{"vehicle": "PL", "between": ["2021-01-01", null]}`
    #[arg(long, conflicts_with_all = ["vehicle", "driver", "from", "to"])]
    filter: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> Result<SearchFilter, GpsReaderError> {
        if let Some(json) = &self.filter {
            return parse_search_args(&serde_json::from_str(json)?);
        }
        Ok(SearchFilter {
            vehicle: self.vehicle.clone(),
            driver: self.driver.clone(),
            between: (self.from.is_some() || self.to.is_some()).then(|| DateRange {
                start: self.from.clone(),
                end: self.to.clone(),
            }),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), GpsReaderError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let table = config.database.table_name()?;
    let database = Database::from_config(&config.database, &cli.company).await?;

    match cli.command {
        Command::Init => database.create_table(&table).await?,
        Command::Info => print!("{}", database.info().await?),
        Command::Search(args) => {
            let search = database.search(&table, &args.to_filter()?);
            for fix in search.fetch_all().await? {
                println!("{}", serde_json::to_string(&fix)?);
            }
        }
        Command::Duplicates => {
            for group in database.find_duplicates(&table).await? {
                println!(
                    "{} x{} (keep id {}): {:?} speed={:?} lon={:?} lat={:?}",
                    group.dt,
                    group.count,
                    group.keep_id,
                    group.position,
                    group.speed,
                    group.longitude,
                    group.latitude
                );
            }
        }
        Command::Dedupe => {
            database.drop_duplicates(&table).await?;
        }
        Command::DropTable => database.drop_table(&table).await?,
        Command::DeleteDatabase => database.delete().await?,
        Command::Report(args) => {
            let analyzer = analyzer(&cli.company, database, table, &args).await?;
            print!("{}", analyzer.route_info()?);
        }
        Command::Crossings(args) => {
            let analyzer = analyzer(&cli.company, database, table, &args).await?;
            for crossing in analyzer.crossing_borders()? {
                println!(
                    "{:<6} {} {} {}",
                    crossing.kind,
                    crossing.dt,
                    crossing.position.as_deref().unwrap_or("-"),
                    crossing.country.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Map {
            args,
            crossings,
            only_crossings,
            out,
        } => {
            let analyzer = analyzer(&cli.company, database, table, &args).await?;
            let map = if only_crossings {
                analyzer.crossing_borders_map()?
            } else {
                analyzer.route_map(crossings)?
            };
            let path =
                out.unwrap_or_else(|| config.output.dir.join(format!("{}_map.html", cli.company)));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            map.save(&path)?;
        }
        Command::Charts(args) => {
            let analyzer = analyzer(&cli.company, database, table, &args).await?;
            std::fs::create_dir_all(&config.output.dir)?;
            analyzer
                .distance_diagram()?
                .save(&config.output.dir.join(format!("{}_distance.svg", cli.company)))?;
            analyzer
                .speed_diagram()?
                .save(&config.output.dir.join(format!("{}_speed.svg", cli.company)))?;
        }
    }

    info!("Done");
    Ok(())
}

async fn analyzer(
    company: &str,
    database: Database,
    table: TableName,
    args: &FilterArgs,
) -> Result<RouteAnalyzer, GpsReaderError> {
    RouteAnalyzer::new(company, database, table, &args.to_filter()?).await
}
