use anyhow::{Context, Result, anyhow};
use apexmf_rs::config::{OutputSet, ProjectPaths, file_name_or_path};
use apexmf_rs::error::WARM_UP_MESSAGE;
use apexmf_rs::io::control::{RunControl, read_control};
use apexmf_rs::io::export::{ExportName, write_comparison, write_series};
use apexmf_rs::io::layer::{read_layer, read_line_layer, read_point_layer};
use apexmf_rs::io::linkage::{
    LinkageStore, copy_linkage_files, write_linkage_files, write_modflow_obs, write_river_grid,
};
use apexmf_rs::io::observed::ObservedTable;
use apexmf_rs::io::output::{self, OutputKind};
use apexmf_rs::linking::{self, PreparedLayer, prepare_features, prepare_rivers};
use apexmf_rs::logging;
use apexmf_rs::postprocess::{self, SeriesRequest, when_ready};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

mod cli;

use cli::{CompareArgs, Command, LinkArgs, get_args};

fn main() -> Result<()> {
    logging::init();

    match get_args() {
        Command::Period { project } => print_period(&project),
        Command::Outputs { project } => print_outputs(&project),
        Command::Link(args) => run_link(&args),
        Command::Compare(args) => run_compare(&args),
    }
}

fn open_project(project: &Path) -> Result<(ProjectPaths, RunControl)> {
    let paths = ProjectPaths::open(project)
        .with_context(|| format!("Failed to open project: {:?}", project))?;
    let control = read_control(&paths.model).context("Failed to read the control file")?;
    Ok((paths, control))
}

fn print_period(project: &Path) -> Result<()> {
    let (_, control) = open_project(project)?;
    let period = control.period();
    let steps: Vec<&str> = control
        .print_code
        .report_timesteps()
        .iter()
        .map(|s| s.label())
        .collect();

    println!("Simulation period:");
    println!("  Start: {}", period.start.format("%m-%d-%Y"));
    println!("  End: {}", period.end.format("%m-%d-%Y"));
    println!("  Duration: {} days", period.duration_days());
    println!("  Print code: {}", control.print_code.value());
    println!("  Reporting steps: {}", steps.join(", "));
    Ok(())
}

fn print_outputs(project: &Path) -> Result<()> {
    let (paths, _) = open_project(project)?;

    println!("Simulation outputs:");
    for kind in OutputKind::value_variants() {
        let layout = kind.layout();
        let status = match output::locate(&paths, &layout)
            .and_then(|path| output::variable_names(&path, &layout).map(|v| (path, v)))
        {
            Ok((path, vars)) => format!("{} ({} variables)", file_name_or_path(&path), vars.len()),
            Err(e) if e.is_not_ready() || e.is_missing() => "not written yet".to_string(),
            Err(e) => format!("unreadable: {}", e),
        };
        println!("  {:?}: {}", kind, status);
    }
    for set in [OutputSet::Hydrology, OutputSet::Solutes] {
        let ready = if paths.outputs_ready(set) { "ready" } else { "not ready" };
        println!("  {:?} post-processing: {}", set, ready);
    }
    Ok(())
}

fn run_link(args: &LinkArgs) -> Result<()> {
    let paths = ProjectPaths::open(&args.project)
        .with_context(|| format!("Failed to open project: {:?}", args.project))?;
    paths
        .ensure_layout()
        .context("Failed to create the project folders")?;
    let config = args.linking_config();

    println!("Reading subbasins...");
    let subbasins = read_layer(&args.subbasins, &config.fields.subbasin_id)?;
    let subbasins = prepare_features("subbasins", subbasins)?;

    println!("Preparing grid...");
    let (grid, max_cell_area) = match (&args.grid, args.spec.grid_spec()) {
        (Some(path), _) => {
            let grid = prepare_features("grid", read_layer(path, &config.fields.grid_id)?)?;
            let max = grid.max_area();
            (grid, max)
        }
        (None, Some(spec)) => (PreparedLayer::from_cells(spec.cells()), spec.max_cell_area()),
        (None, None) => {
            return Err(anyhow!(
                "No grid given: pass --grid or --x-origin/--y-origin/--nrow/--ncol/--cell-size"
            ));
        }
    };

    println!("\nLinking Configuration:");
    println!("  Subbasins: {}", subbasins.features.len());
    println!("  Grid cells: {}", grid.features.len());
    match config.bounded_threshold(max_cell_area) {
        Some(t) => println!("  Area threshold: {} of max {} ({:?})", t, max_cell_area, config.rule),
        None => println!("  Area threshold: none"),
    }

    let pb = ProgressBar::new(subbasins.features.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} subbasins ({eta})")?
            .progress_chars("#>-"),
    );

    println!("\nIntersecting subbasins with the grid...");
    let table = linking::link(&subbasins, &grid, &config, &pb);
    pb.finish_and_clear();

    if table.is_empty() {
        println!("No subbasin overlaps a grid cell; writing empty linkage tables.");
    }

    let [sub_grid, grid_sub] = write_linkage_files(&paths, &table)?;
    copy_linkage_files(&paths)?;
    let mut store = LinkageStore::open(&paths.linkage_db())?;
    store.save(&table)?;

    println!(
        "\nLinking complete: {} subbasin-cell pairs, {:.2} total area.",
        table.len(),
        table.total_area()
    );
    println!(
        "Saved {} and {} to {:?}",
        file_name_or_path(&sub_grid),
        file_name_or_path(&grid_sub),
        paths.table
    );

    if let Some(path) = &args.rivers {
        let rivers = prepare_rivers("rivers", read_line_layer(path, &config.fields.river_id)?)?;
        println!("\nClipping {} river reaches to the grid...", rivers.len());
        let pb = ProgressBar::new(rivers.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} reaches ({eta})")?
                .progress_chars("#>-"),
        );
        let table = linking::link_rivers(&rivers, &grid, &config, &pb);
        pb.finish_and_clear();
        let river_grid = write_river_grid(&paths, &table)?;
        println!(
            "River cells: {} ({:.2} total length), saved {}",
            table.cells().len(),
            table.total_length(),
            file_name_or_path(&river_grid)
        );
    }

    if let Some(path) = &args.obs_points {
        let points = read_point_layer(path, &config.fields.obs_point_id)?;
        let total = points.len();
        let located = linking::locate_points(points, &grid);
        let obs = write_modflow_obs(&paths, &located)?;
        println!(
            "\n{} of {} observation points fall in the grid; '{}' file is created in your APEX-MODFLOW folder",
            located.len(),
            total,
            file_name_or_path(&obs)
        );
    }
    Ok(())
}

fn run_compare(args: &CompareArgs) -> Result<()> {
    let (paths, control) = open_project(&args.project)?;
    let kind = args
        .kind()
        .ok_or_else(|| anyhow!("Pass --kind or --solute"))?;
    let variable = args
        .variable()
        .ok_or_else(|| anyhow!("Pass --variable or --solute"))?;

    let mut request = SeriesRequest::new(kind, args.entity, variable, args.report);
    request.from_year = args.from_year;
    let step = postprocess::effective_step(&control, &request);
    let mut name = ExportName::new(kind.export_prefix(), args.entity, step);

    let exported = match (&args.obs, &args.gauge) {
        (Some(obs), Some(gauge)) => {
            let observed = ObservedTable::read(obs)
                .and_then(|table| table.series(gauge))
                .with_context(|| format!("Failed to read observed data: {:?}", obs))?;
            let Some(comparison) = when_ready(postprocess::compare(&paths, &control, &request, &observed))?
            else {
                println!("{}", WARM_UP_MESSAGE);
                return Ok(());
            };

            println!(
                "{} {} values of {} against {}",
                comparison.aligned.len(),
                step.label(),
                comparison.aligned.sim_name,
                comparison.aligned.obs_name
            );
            print!("{}", comparison.stats);

            name = name.with_gauge(gauge.as_str());
            if args.export {
                Some(write_export(&paths, |dir| write_comparison(dir, &name, &comparison))?)
            } else {
                None
            }
        }
        _ => {
            let Some(sim) = when_ready(postprocess::load_simulated(&paths, &control, &request))? else {
                println!("{}", WARM_UP_MESSAGE);
                return Ok(());
            };
            println!("{} {} values of {}", sim.len(), step.label(), sim.name);
            if args.export {
                Some(write_export(&paths, |dir| write_series(dir, &name, &sim))?)
            } else {
                None
            }
        }
    };

    if let Some(path) = exported {
        println!(
            "'{}' file is exported to your 'exported_files' folder!",
            file_name_or_path(&path)
        );
    }
    Ok(())
}

fn write_export(
    paths: &ProjectPaths,
    write: impl FnOnce(&Path) -> std::io::Result<PathBuf>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(&paths.exported_files)
        .with_context(|| format!("Failed to create {:?}", paths.exported_files))?;
    write(&paths.exported_files).context("Failed to write export file")
}
