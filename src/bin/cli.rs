//! roadmatch CLI - merge, minify and rate-summary pipelines
//!
//! Usage:
//!   roadmatch-cli merge --segments <csv> --crashes <csv> --geometry <geojson>... [--yearly <csv>...]
//!   roadmatch-cli minify --merged <geojson> --candidates <geojson> --out <file>
//!   roadmatch-cli rates --merged <geojson>
//!   roadmatch-cli rates-by-county --crashes <csv> --census <csv> --out <file>
//!
//! This binary is the I/O collaborator around the roadmatch core: it parses
//! CSV/GeoJSON sources, feeds already-parsed records to the index/matchers,
//! and serializes their results. The core itself owns no file formats.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde_json::{json, Value as JsonValue};

use roadmatch::{
    average_aadt, is_interstate, line_coords, rank_county_rates, weighted_crash_rate,
    CorridorIntervalIndex, CrashMatcher, CrashRecord, CountyPopulations, DedupConfig,
    DepartmentFilter, FieldPrecedence, LineDeduplicator, OptionExt, Result, SegmentKey,
    SegmentMetrics, SegmentRecord, SignedRouteMap, SpatialGridIndex,
};

#[derive(Parser)]
#[command(name = "roadmatch-cli")]
#[command(about = "Road segment merging, deduplication and crash-rate reporting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge segment, traffic and crash sources into annotated road geometry
    Merge {
        /// Base-year segment CSV (CORR_ID, CORR_MP, CORR_ENDMP, DEPT_ID, TYC_AADT, SEC_LNT_MI)
        #[arg(long)]
        segments: PathBuf,

        /// Additional yearly traffic-count CSVs for AADT averaging
        #[arg(long = "yearly")]
        yearly: Vec<PathBuf>,

        /// Crash events CSV (CORRIDOR, REF_POINT)
        #[arg(long)]
        crashes: PathBuf,

        /// Segment geometry GeoJSON files, first match per key wins
        #[arg(long = "geometry")]
        geometry: Vec<PathBuf>,

        /// On-system routes CSV mapping departmental to signed routes
        #[arg(long)]
        routes: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "output/merged_data")]
        out_dir: PathBuf,
    },

    /// Drop candidate lines that already exist in the merged dataset
    Minify {
        /// Merged traffic lines GeoJSON (the existing dataset)
        #[arg(long)]
        merged: PathBuf,

        /// Simplified candidate lines GeoJSON
        #[arg(long)]
        candidates: PathBuf,

        /// Output GeoJSON of kept (novel) candidates
        #[arg(short, long)]
        out: PathBuf,

        /// Sample points per line
        #[arg(long, default_value = "12")]
        samples: usize,

        /// Maximum match distance in meters
        #[arg(long, default_value = "50.0")]
        max_distance: f64,

        /// Maximum bearing difference in degrees
        #[arg(long, default_value = "30.0")]
        max_bearing_diff: f64,

        /// Fraction of matched samples that classifies a duplicate
        #[arg(long, default_value = "0.25")]
        match_fraction: f64,
    },

    /// Length-weighted crash-rate summary of a merged dataset
    Rates {
        /// Merged traffic lines GeoJSON
        #[arg(long)]
        merged: PathBuf,
    },

    /// Rank counties by crashes per 100k residents
    RatesByCounty {
        /// Crash events CSV with a COUNTY column
        #[arg(long)]
        crashes: PathBuf,

        /// Census CSV (COUNTY, TOT_POP)
        #[arg(long)]
        census: PathBuf,

        /// Output ranking CSV
        #[arg(short, long, default_value = "output/ranking_by_county.csv")]
        out: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Merge {
            segments,
            yearly,
            crashes,
            geometry,
            routes,
            out_dir,
        } => run_merge(
            &segments,
            &yearly,
            &crashes,
            &geometry,
            routes.as_deref(),
            &out_dir,
            cli.verbose,
        ),
        Commands::Minify {
            merged,
            candidates,
            out,
            samples,
            max_distance,
            max_bearing_diff,
            match_fraction,
        } => {
            let config = DedupConfig {
                sample_count: samples,
                max_distance_m: max_distance,
                max_bearing_diff_deg: max_bearing_diff,
                match_fraction,
                ..DedupConfig::default()
            };
            run_minify(&merged, &candidates, &out, &config)
        }
        Commands::Rates { merged } => run_rates(&merged),
        Commands::RatesByCounty {
            crashes,
            census,
            out,
        } => run_rates_by_county(&crashes, &census, &out),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// merge
// ============================================================================

fn run_merge(
    segments_path: &Path,
    yearly_paths: &[PathBuf],
    crashes_path: &Path,
    geometry_paths: &[PathBuf],
    routes_path: Option<&Path>,
    out_dir: &Path,
    verbose: bool,
) -> Result<()> {
    let base = read_segment_csv(segments_path)?;
    println!("Loaded {} base segments from {}", base.len(), segments_path.display());

    // AADT observations across all years, base year included
    let mut observations: Vec<(SegmentKey, Option<f64>)> =
        base.iter().map(|r| (r.key(), r.aadt)).collect();
    for path in yearly_paths {
        let yearly = read_segment_csv(path)?;
        if verbose {
            println!("  {} rows from {}", yearly.len(), path.display());
        }
        observations.extend(yearly.iter().map(|r| (r.key(), r.aadt)));
    }
    let years = 1 + yearly_paths.len() as u32;
    let averaged = average_aadt(&observations);

    let index = CorridorIntervalIndex::build(&base);
    let crashes = read_crash_csv(crashes_path)?;
    println!("Loaded {} crash events from {}", crashes.len(), crashes_path.display());

    let matcher = CrashMatcher::new(&index);
    let counts = matcher.count_crashes(&crashes);

    let signed_routes = match routes_path {
        Some(path) => read_routes_csv(path)?,
        None => SignedRouteMap::new(),
    };

    let geometry = read_geometry_map(geometry_paths)?;
    println!("Loaded geometry for {} segment keys", geometry.len());

    let filter = DepartmentFilter::default();
    let mut seen: HashSet<SegmentKey> = HashSet::new();
    let mut features = Vec::new();
    let mut filtered_department = 0usize;
    let mut filtered_low_volume = 0usize;
    let mut missing_geometry = 0usize;

    for record in &base {
        let key = record.key();
        if !seen.insert(key.clone()) {
            continue;
        }

        let aadt = averaged
            .get(&key)
            .and_then(|a| a.mean_aadt)
            .or(record.aadt);
        // low-volume segments carry no meaningful rate
        if aadt.map_or(true, |a| a < 1.0) {
            filtered_low_volume += 1;
            continue;
        }
        if !filter.retains(&key.department) {
            filtered_department += 1;
            continue;
        }
        let Some(source) = geometry.get(&key) else {
            missing_geometry += 1;
            continue;
        };

        let total_crashes = counts.get(&key).copied().unwrap_or(0);
        let metrics = SegmentMetrics::compute(total_crashes, years, record.length_miles, aadt);
        let signed_route = signed_routes
            .signed_route(&key.department)
            .unwrap_or("")
            .to_string();

        features.push(Feature {
            bbox: None,
            geometry: source.geometry.clone(),
            id: None,
            properties: Some(merged_properties(
                &key,
                record,
                &metrics,
                &signed_route,
                aadt,
            )),
            foreign_members: None,
        });
    }

    println!(
        "Merged {} segments ({} low-volume, {} filtered by department class, {} without geometry)",
        features.len(),
        filtered_low_volume,
        filtered_department,
        missing_geometry
    );

    fs::create_dir_all(out_dir)?;
    let geojson_path = out_dir.join("merged_traffic_lines.geojson");
    let csv_path = out_dir.join("merged_traffic_lines.csv");
    write_feature_collection(&geojson_path, features.clone())?;
    write_properties_csv(&csv_path, &features)?;
    println!("Wrote {} lines to {}", features.len(), out_dir.display());

    Ok(())
}

fn merged_properties(
    key: &SegmentKey,
    record: &SegmentRecord,
    metrics: &SegmentMetrics,
    signed_route: &str,
    aadt: Option<f64>,
) -> JsonObject {
    let mut props = JsonObject::new();
    props.insert("SEGMENT_KEY".to_string(), json!(key.to_string()));
    props.insert("CORRIDOR".to_string(), json!(key.corridor));
    props.insert("CORR_MP".to_string(), json!(key.start_mp));
    props.insert("CORR_ENDMP".to_string(), json!(key.end_mp));
    props.insert("DEPT_ID".to_string(), json!(key.department));
    props.insert("SEC_LNT_MI".to_string(), json!(record.length_miles));
    props.insert("SIGNED_ROUTE".to_string(), json!(signed_route));
    props.insert("TOTAL_CRASHES".to_string(), json!(metrics.total_crashes));
    props.insert("AVG_CRASHES".to_string(), json!(metrics.avg_crashes_per_year));
    props.insert("PER_100M_VMT".to_string(), json!(metrics.per_100m_vmt));
    props.insert("TYC_AADT".to_string(), json!(aadt));
    props
}

// ============================================================================
// minify
// ============================================================================

fn run_minify(
    merged_path: &Path,
    candidates_path: &Path,
    out_path: &Path,
    config: &DedupConfig,
) -> Result<()> {
    let merged = read_feature_collection(merged_path)?;
    let candidates = read_feature_collection(candidates_path)?;
    let total_candidates = candidates.len();

    let index = SpatialGridIndex::from_features(&merged, config);
    let deduplicator = LineDeduplicator::new(&index);
    let outcome = deduplicator.dedup_features(candidates);

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_feature_collection(out_path, outcome.kept)?;

    println!("Total candidate features: {}", total_candidates);
    println!("Removed (matched) features: {}", outcome.removed_count);
    println!("Kept (unmatched) features: {}", outcome.kept_count);

    let in_size = fs::metadata(candidates_path)?.len();
    let out_size = fs::metadata(out_path)?.len();
    println!("Input size: {:.2} MB", in_size as f64 / 1024.0 / 1024.0);
    println!("Output size: {:.2} MB", out_size as f64 / 1024.0 / 1024.0);

    Ok(())
}

// ============================================================================
// rates
// ============================================================================

fn run_rates(merged_path: &Path) -> Result<()> {
    let features = read_feature_collection(merged_path)?;
    println!("Processing {} road segments...", features.len());

    let aadt_fields = FieldPrecedence::aadt();
    let crash_fields = FieldPrecedence::crash_counts();

    // (length_miles, rate) per segment, split by road class
    let mut all: Vec<(f64, f64)> = Vec::new();
    let mut interstate: Vec<(f64, f64)> = Vec::new();
    let mut non_interstate: Vec<(f64, f64)> = Vec::new();
    let mut total_crashes = 0u64;
    let mut total_daily_vmt = 0.0f64;

    for feature in &features {
        let Some(props) = feature.properties.as_ref() else {
            continue;
        };
        let Some(rate) = props.get("PER_100M_VMT").and_then(json_number) else {
            continue;
        };
        if rate <= 0.0 {
            continue;
        }

        // prefer the official section length, fall back to geometry
        let length = props
            .get("SEC_LNT_MI")
            .and_then(json_number)
            .or_else(|| {
                line_coords(feature).map(|coords| roadmatch::geo_utils::line_length_miles(&coords))
            });
        let Some(length) = length else { continue };

        total_crashes += crash_fields.resolve_u64(props).unwrap_or(0);
        if let Some(aadt) = aadt_fields.resolve_f64(props) {
            if aadt > 0.0 {
                total_daily_vmt += length * aadt;
            }
        }

        let signed = props.get("SIGNED_ROUTE").and_then(JsonValue::as_str);
        let department = props
            .get("DEPT_ID")
            .and_then(JsonValue::as_str)
            .unwrap_or("");

        all.push((length, rate));
        if is_interstate(signed, department) {
            interstate.push((length, rate));
        } else {
            non_interstate.push((length, rate));
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("LENGTH-WEIGHTED AVERAGE CRASH RATES");
    println!("{}", "=".repeat(60));
    print_rate_summary("All roads", &all);
    print_rate_summary("Interstates", &interstate);
    print_rate_summary("Non-interstates", &non_interstate);

    println!("\nTotal crashes: {}", total_crashes);
    println!("Total daily VMT: {:.0}", total_daily_vmt);

    let i_rate = weighted_crash_rate(&interstate).rate;
    let n_rate = weighted_crash_rate(&non_interstate).rate;
    if i_rate > 0.0 && n_rate > 0.0 {
        println!(
            "Crash rate ratio (non-interstate/interstate): {:.2}x",
            n_rate / i_rate
        );
    }

    Ok(())
}

fn print_rate_summary(name: &str, segments: &[(f64, f64)]) {
    let summary = weighted_crash_rate(segments);
    println!("\n{}", name);
    println!("  Number of segments: {}", segments.len());
    println!("  Total road miles: {:.2}", summary.total_miles);
    println!("  Weighted avg crash rate: {:.2} per 100M VMT", summary.rate);
    match summary.miles_per_crash {
        Some(miles) => println!("  Expected miles per crash: {:.0}", miles),
        None => println!("  Expected miles per crash: N/A (no crashes)"),
    }
}

// ============================================================================
// rates-by-county
// ============================================================================

fn run_rates_by_county(crashes_path: &Path, census_path: &Path, out_path: &Path) -> Result<()> {
    let counties = read_county_column(crashes_path)?;
    let populations = read_census_csv(census_path)?;
    println!(
        "Loaded {} crash events, {} census counties",
        counties.len(),
        populations.len()
    );

    let ranking = rank_county_rates(&counties, &populations);

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(out_path)?;
    writer.write_record(["county", "totalAccidents", "accidentsPer100kResidents"])?;
    for row in &ranking {
        let rate = row
            .per_100k_residents
            .map(|r| format!("{:.2}", r))
            .unwrap_or_default();
        writer.write_record([row.county.clone(), row.total_crashes.to_string(), rate])?;
    }
    writer.flush()?;
    println!("Wrote {} county rows to {}", ranking.len(), out_path.display());

    Ok(())
}

fn read_county_column(path: &Path) -> Result<Vec<String>> {
    let context = path.display().to_string();
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let county = column_index(&headers, "COUNTY").ok_or_missing_column("COUNTY", &context)?;

    let mut counties = Vec::new();
    for row in reader.records() {
        let row = row?;
        counties.push(row.get(county).unwrap_or("").to_string());
    }
    Ok(counties)
}

fn read_census_csv(path: &Path) -> Result<CountyPopulations> {
    let context = path.display().to_string();
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let county = column_index(&headers, "COUNTY").ok_or_missing_column("COUNTY", &context)?;
    let population =
        column_index(&headers, "TOT_POP").ok_or_missing_column("TOT_POP", &context)?;

    let mut populations = CountyPopulations::new();
    for row in reader.records() {
        let row = row?;
        // unparseable populations count as zero, which ranks as "no rate"
        let total = row
            .get(population)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        populations.insert(row.get(county).unwrap_or(""), total);
    }
    Ok(populations)
}

// ============================================================================
// CSV input
// ============================================================================

fn read_segment_csv(path: &Path) -> Result<Vec<SegmentRecord>> {
    let context = path.display().to_string();
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let corridor = column_index(&headers, "CORR_ID").ok_or_missing_column("CORR_ID", &context)?;
    let start_mp = column_index(&headers, "CORR_MP").ok_or_missing_column("CORR_MP", &context)?;
    let end_mp =
        column_index(&headers, "CORR_ENDMP").ok_or_missing_column("CORR_ENDMP", &context)?;
    let department =
        column_index(&headers, "DEPT_ID").ok_or_missing_column("DEPT_ID", &context)?;
    let aadt = column_index(&headers, "TYC_AADT");
    let length = column_index(&headers, "SEC_LNT_MI");

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = SegmentRecord::new(
            row.get(corridor).unwrap_or(""),
            row.get(start_mp).unwrap_or(""),
            row.get(end_mp).unwrap_or(""),
            row.get(department).unwrap_or(""),
        );
        record.aadt = aadt.and_then(|i| row.get(i)).and_then(parse_lenient);
        record.length_miles = length.and_then(|i| row.get(i)).and_then(parse_lenient);
        records.push(record);
    }
    Ok(records)
}

fn read_crash_csv(path: &Path) -> Result<Vec<CrashRecord>> {
    let context = path.display().to_string();
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let corridor = column_index(&headers, "CORRIDOR").ok_or_missing_column("CORRIDOR", &context)?;
    let reference =
        column_index(&headers, "REF_POINT").ok_or_missing_column("REF_POINT", &context)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(CrashRecord {
            corridor: row.get(corridor).unwrap_or("").to_string(),
            reference_point: row.get(reference).unwrap_or("").to_string(),
        });
    }
    Ok(records)
}

fn read_routes_csv(path: &Path) -> Result<SignedRouteMap> {
    let context = path.display().to_string();
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let departmental = column_index(&headers, "DEPARTMENTAL ROUTE")
        .ok_or_missing_column("DEPARTMENTAL ROUTE", &context)?;
    let signed = column_index(&headers, "SIGNED ROUTE")
        .ok_or_missing_column("SIGNED ROUTE", &context)?;

    let mut map = SignedRouteMap::new();
    for row in reader.records() {
        let row = row?;
        map.insert(row.get(departmental).unwrap_or(""), row.get(signed).unwrap_or(""));
    }
    Ok(map)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn parse_lenient(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// GeoJSON input/output
// ============================================================================

fn read_feature_collection(path: &Path) -> Result<Vec<Feature>> {
    let raw = fs::read_to_string(path)?;
    match raw.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        GeoJson::Feature(feature) => Ok(vec![feature]),
        GeoJson::Geometry(_) => Err(roadmatch::RoadMatchError::InvalidGeometry {
            reason: format!("{} is a bare geometry, expected a FeatureCollection", path.display()),
        }),
    }
}

fn read_geometry_map(paths: &[PathBuf]) -> Result<HashMap<SegmentKey, Feature>> {
    let mut map: HashMap<SegmentKey, Feature> = HashMap::new();
    for path in paths {
        for feature in read_feature_collection(path)? {
            let Some(key) = feature_segment_key(&feature) else {
                continue;
            };
            // first file providing a key wins
            map.entry(key).or_insert(feature);
        }
    }
    Ok(map)
}

fn feature_segment_key(feature: &Feature) -> Option<SegmentKey> {
    let props = feature.properties.as_ref()?;
    let field = |name: &str| {
        props
            .get(name)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .map(str::to_string)
    };
    Some(
        SegmentRecord::new(
            &field("CORR_ID")?,
            &field("CORR_MP")?,
            &field("CORR_ENDMP")?,
            &field("DEPT_ID")?,
        )
        .key(),
    )
}

fn write_feature_collection(path: &Path, features: Vec<Feature>) -> Result<()> {
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    // compact JSON, no indentation, to keep output small
    fs::write(path, GeoJson::FeatureCollection(collection).to_string())?;
    Ok(())
}

/// Write the merged features' properties as CSV, without geometry.
fn write_properties_csv(path: &Path, features: &[Feature]) -> Result<()> {
    let Some(first) = features.first().and_then(|f| f.properties.as_ref()) else {
        fs::write(path, "")?;
        return Ok(());
    };

    let columns: Vec<&String> = first.keys().collect();
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&columns)?;

    for feature in features {
        let Some(props) = feature.properties.as_ref() else {
            continue;
        };
        let row: Vec<String> = columns
            .iter()
            .map(|c| props.get(*c).map(json_cell).unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn json_cell(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
