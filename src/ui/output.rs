use crate::analyser::core::Dataset;
use crate::analyser::features::FieldDictionary;
use crate::error::Result;
use ansi_term::Colour;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const FEATURES_FILE: &str = "Features.csv";
pub const FIELD_NAMES_FILE: &str = "Feature Names.csv";

/// Pandas spelling of booleans, which the downstream reader expects.
fn pandas_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// One row per session, a leading unnamed index column, empty cells for features
/// a session never reached.
pub fn write_features<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let columns = dataset.columns();
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(std::iter::once("").chain(columns.iter().map(String::as_str)))?;
    for (index, row) in dataset.rows.iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(index.to_string());
        record.push(row.label.clone());
        record.push(pandas_bool(row.missing_ccs_fin).to_string());
        for column in &columns[2..] {
            record.push(row.features.get(column).map_or(String::new(), |value| value.to_string()));
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_field_names<W: Write>(dictionary: &FieldDictionary, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["", "machine", "human"])?;
    for (index, (machine, human)) in dictionary.iter().enumerate() {
        wtr.write_record([index.to_string().as_str(), machine, human.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `Features.csv` and `Feature Names.csv` into `out_dir`.
pub fn save_tables(dataset: &Dataset, out_dir: &Path) -> Result<()> {
    let features = out_dir.join(FEATURES_FILE);
    write_features(dataset, fs::File::create(&features)?)?;
    log::info!("Wrote {}", features.display());

    let names = out_dir.join(FIELD_NAMES_FILE);
    write_field_names(&dataset.dictionary, fs::File::create(&names)?)?;
    log::info!("Wrote {}", names.display());
    Ok(())
}

pub fn data_as_json(dataset: &Dataset) -> Result<String> {
    Ok(serde_json::to_string_pretty(dataset)?)
}


pub fn print_results(dataset: &Dataset) {
    let stats = &dataset.stats;
    let elapsed = dataset.finished - dataset.started;

    println!("\n\u{250F}\u{2501}\u{2501}\u{2501}\u{2501} Results");
    println!("\u{2503}");
    println!("\u{2503} Sessions         : {}", Colour::Fixed(226).paint(stats.sessions.to_string()));
    println!("\u{2503} Rows kept        : {}", Colour::Green.paint(stats.kept.to_string()));
    println!("\u{2503} Discarded        : {}", Colour::Fixed(226).paint(stats.discarded.to_string()));
    println!("\u{2503} Unlabeled rows   : {}", paint_problem(stats.unlabeled));
    println!("\u{2503} Feature columns  : {}", Colour::Fixed(226).paint(dataset.dictionary.len().to_string()));
    println!("\u{2503} Slices           : {} ({} failed)", stats.slices, paint_problem(stats.failed_slices));
    println!("\u{2503} Elapsed          : {}.{:03}s", elapsed.num_seconds(), elapsed.num_milliseconds() % 1000);
    println!("\u{2503} ");
}

fn paint_problem(count: usize) -> ansi_term::ANSIGenericString<'static, str> {
    if count == 0 {
        Colour::Green.paint(count.to_string())
    } else {
        Colour::Red.paint(count.to_string())
    }
}
