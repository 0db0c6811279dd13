//! Fast-path converter for classic (non-arctan) performance logs.
//!
//! Brute-force regex extraction with no record parsing: each record is a
//! flat run of `<key>K</key><map><key>Calls</key><integer>N</integer>
//! <key>Time</key><real>T</real></map>` pairs. The keys found in record 1
//! are treated as the schema for the whole file; if the log format ever
//! changes this will fail utterly. Kept deliberately separate from the
//! streaming record parser.

use crate::Result;
use anyhow::{Context, bail};
use log::info;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;

const PAIR_RE: &str = concat!(
    r"<key>(.*?)</key><map>",
    r"<key>Calls</key><integer>(.*?)</integer>",
    r"<key>Time</key><real>(.*?)</real></map>"
);

pub fn convert_log(infile: &str, outfile: &str) -> Result<()> {
    info!("input {infile} output {outfile}");
    let text =
        fs::read_to_string(infile).with_context(|| format!("read performance log {infile}"))?;
    convert_text(&text, outfile)?;
    Ok(())
}

fn convert_text(text: &str, outfile: &str) -> Result<()> {
    // Flatten the whole document so the pair regex never straddles a line
    // break or indentation run.
    let data: String = text.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    let squeeze = Regex::new(r"\s{2,}")?;
    let data = squeeze.replace_all(&data, "");
    let pair = Regex::new(PAIR_RE)?;

    let mut writer = csv::Writer::from_path(outfile)
        .with_context(|| format!("create csv file {outfile}"))?;

    let mut schema: Vec<String> = Vec::new();
    let mut count = 0usize;
    for record in data.split("<llsd>") {
        if record.is_empty() {
            continue;
        }
        count += 1;

        let mut times: BTreeMap<&str, &str> = BTreeMap::new();
        let mut calls: BTreeMap<&str, &str> = BTreeMap::new();
        for caps in pair.captures_iter(record) {
            let (_, [key, call, time]) = caps.extract();
            times.insert(key, time);
            calls.insert(key, call);
        }

        if count == 1 {
            schema = times.keys().map(|k| k.to_string()).collect();
            info!("key count {}", schema.len());
            let mut header: Vec<String> =
                schema.iter().map(|key| format!("{key} - Times")).collect();
            header.extend(schema.iter().map(|key| format!("{key} - Calls")));
            writer.write_record(&header)?;
        }

        let mut row: Vec<&str> = Vec::with_capacity(schema.len() * 2);
        for key in &schema {
            match times.get(key.as_str()) {
                Some(time) => row.push(time),
                None => bail!("record {count} is missing key {key:?} from record 1"),
            }
        }
        for key in &schema {
            match calls.get(key.as_str()) {
                Some(call) => row.push(call),
                None => bail!("record {count} is missing key {key:?} from record 1"),
            }
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    info!("done, {count} records");
    Ok(())
}
