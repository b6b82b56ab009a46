use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;

/// Write a synthetic peptide document for trying out `rusty-rt`.
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Output Parquet file
    #[arg(default_value = "sample_peptides.parquet")]
    output: PathBuf,

    /// Number of target peptides
    #[arg(long, short = 'n', default_value_t = 300)]
    peptides: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

const RESIDUES: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

/// Rough per-residue retention coefficients.
fn residue_coefficient(residue: u8) -> f64 {
    match residue {
        b'W' => 8.8,
        b'F' => 8.1,
        b'L' => 8.1,
        b'I' => 7.4,
        b'M' => 5.5,
        b'V' => 5.0,
        b'Y' => 4.5,
        b'C' => 2.6,
        b'P' => 2.0,
        b'A' => 1.1,
        b'T' => 0.8,
        b'G' => -0.5,
        b'S' => -0.2,
        b'E' => 0.0,
        b'Q' => -0.9,
        b'D' => -0.5,
        b'N' => -1.2,
        b'R' => -2.3,
        b'H' => -3.0,
        b'K' => -2.1,
        _ => 0.0,
    }
}

fn hydrophobicity(sequence: &str) -> f64 {
    sequence.bytes().map(residue_coefficient).sum()
}

fn random_sequence(rng: &mut SimpleRng) -> String {
    let len = 7 + (rng.next_u64() % 14) as usize;
    let mut seq: Vec<u8> = (0..len - 1)
        .map(|_| RESIDUES[(rng.next_u64() % RESIDUES.len() as u64) as usize])
        .collect();
    seq.push(if rng.next_f64() < 0.5 { b'K' } else { b'R' });
    String::from_utf8_lossy(&seq).into_owned()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

#[derive(Default)]
struct Columns {
    sequence: Vec<String>,
    decoy: Vec<bool>,
    standard: Vec<bool>,
    best_result: Vec<Option<i64>>,
    run1: Vec<Option<f64>>,
    run2: Vec<Option<f64>>,
    score: Vec<Option<f64>>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    // Retention time = 1.1 · score + 5, run2 eluting slightly later.
    let (slope, intercept, run_shift) = (1.1, 5.0, 0.4);
    let mut cols = Columns::default();
    let mut outliers = 0;

    for i in 0..args.peptides {
        let sequence = random_sequence(&mut rng);
        let score = hydrophobicity(&sequence);
        let mut rt = slope * score + intercept + rng.gauss(0.0, 0.8);
        // A few peptides are misidentified and elute far from prediction.
        if i >= 10 && rng.next_f64() < 0.05 {
            rt += rng.gauss(0.0, 1.0).signum() * (15.0 + 10.0 * rng.next_f64());
            outliers += 1;
        }
        let observed = |rng: &mut SimpleRng| rng.next_f64() >= 0.05;
        let run1 = observed(&mut rng).then_some(rt);
        let run2 = observed(&mut rng).then(|| rt + run_shift + rng.gauss(0.0, 0.2));

        cols.best_result.push(match (run1, run2) {
            (Some(_), Some(_)) => Some((rng.next_u64() % 2) as i64),
            (Some(_), None) => Some(0),
            (None, Some(_)) => Some(1),
            (None, None) => None,
        });
        cols.decoy.push(false);
        cols.standard.push(i < 10);
        cols.run1.push(run1);
        cols.run2.push(run2);
        cols.score.push(Some(score));
        cols.sequence.push(sequence);
    }

    // Decoys: reversed targets with random times.
    let decoys = args.peptides / 10;
    for i in 0..decoys {
        let target = &cols.sequence[i];
        let (body, terminus) = target.split_at(target.len() - 1);
        let sequence: String = body.chars().rev().chain(terminus.chars()).collect();
        let rt = intercept + 60.0 * rng.next_f64();
        cols.sequence.push(sequence.clone());
        cols.decoy.push(true);
        cols.standard.push(false);
        cols.best_result.push(Some(0));
        cols.run1.push(Some(rt));
        cols.run2.push(Some(rt + run_shift));
        cols.score.push(Some(hydrophobicity(&sequence)));
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("sequence", DataType::Utf8, false),
        Field::new("decoy", DataType::Boolean, false),
        Field::new("standard", DataType::Boolean, false),
        Field::new("best_result", DataType::Int64, true),
        Field::new("rt:run1", DataType::Float64, true),
        Field::new("rt:run2", DataType::Float64, true),
        Field::new("score:Hydrophobicity", DataType::Float64, true),
    ]));

    let n_rows = cols.sequence.len();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(cols.sequence)),
        Arc::new(BooleanArray::from(cols.decoy)),
        Arc::new(BooleanArray::from(cols.standard)),
        Arc::new(Int64Array::from(cols.best_result)),
        Arc::new(Float64Array::from(cols.run1)),
        Arc::new(Float64Array::from(cols.run2)),
        Arc::new(Float64Array::from(cols.score)),
    ];
    let batch =
        RecordBatch::try_new(schema.clone(), columns).context("Failed to create RecordBatch")?;

    let file = std::fs::File::create(&args.output).context("Failed to create output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("Failed to create writer")?;
    writer.write(&batch).context("Failed to write batch")?;
    writer.close().context("Failed to close writer")?;

    println!(
        "Wrote {n_rows} peptides ({} targets, {decoys} decoys, {outliers} outliers) to {}",
        args.peptides,
        args.output.display()
    );
    Ok(())
}
