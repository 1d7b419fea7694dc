use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

const TOOLS: [&str; 5] = ["Excel", "SQL", "Python", "Power BI", "Tableau"];
const INDUSTRIES: [&str; 5] = ["Finance", "Tech", "Health", "Education", "Retail"];
const EXPERIENCE: [&str; 4] = ["0-1 years", "1-3 years", "3-5 years", "5+ years"];
const EDUCATION: [&str; 4] = ["High School", "BSc", "MSc", "PhD"];
const SATISFACTION: [&str; 5] = [
    "Very Dissatisfied",
    "Dissatisfied",
    "Neutral",
    "Satisfied",
    "Very Satisfied",
];
const MOTIVATION: [&str; 5] = ["Very Low", "Low", "Moderate", "High", "Very High"];

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

    /// Uniform index in `0..n`.
    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    fn pick<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.below(choices.len())]
    }
}

struct Response {
    tools: &'static str,
    industry: &'static str,
    experience: &'static str,
    education: &'static str,
    satisfaction: usize,
    motivation: usize,
}

/// Satisfaction and motivation move together, with some noise.
fn generate(n: usize, rng: &mut SimpleRng) -> Vec<Response> {
    (0..n)
        .map(|_| {
            let satisfaction = rng.below(SATISFACTION.len());
            let drift = rng.below(3) as i64 - 1;
            let motivation = (satisfaction as i64 + drift).clamp(0, MOTIVATION.len() as i64 - 1) as usize;
            Response {
                tools: rng.pick(&TOOLS),
                industry: rng.pick(&INDUSTRIES),
                experience: rng.pick(&EXPERIENCE),
                education: rng.pick(&EDUCATION),
                satisfaction,
                motivation,
            }
        })
        .collect()
}

fn write_csv(path: &str, responses: &[Response]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("creating {path}"))?;
    wtr.write_record([
        "respondent_id",
        "tools",
        "industry",
        "experience",
        "education",
        "satisfaction",
        "motivation",
        "satisfaction_numeric",
        "motivation_numeric",
    ])?;
    for (id, r) in responses.iter().enumerate() {
        wtr.write_record([
            id.to_string(),
            r.tools.to_string(),
            r.industry.to_string(),
            r.experience.to_string(),
            r.education.to_string(),
            SATISFACTION[r.satisfaction].to_string(),
            MOTIVATION[r.motivation].to_string(),
            (r.satisfaction + 1).to_string(),
            (r.motivation + 1).to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_parquet(path: &str, responses: &[Response]) -> Result<()> {
    let strings = |f: fn(&Response) -> &'static str| -> ArrayRef {
        Arc::new(StringArray::from(responses.iter().map(f).collect::<Vec<_>>()))
    };
    let numbers = |f: fn(&Response) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from(responses.iter().map(f).collect::<Vec<_>>()))
    };

    let schema = Arc::new(Schema::new(vec![
        Field::new("respondent_id", DataType::Int64, false),
        Field::new("tools", DataType::Utf8, false),
        Field::new("industry", DataType::Utf8, false),
        Field::new("experience", DataType::Utf8, false),
        Field::new("education", DataType::Utf8, false),
        Field::new("satisfaction", DataType::Utf8, false),
        Field::new("motivation", DataType::Utf8, false),
        Field::new("satisfaction_numeric", DataType::Int64, false),
        Field::new("motivation_numeric", DataType::Int64, false),
    ]));

    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(0..responses.len() as i64));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            ids,
            strings(|r| r.tools),
            strings(|r| r.industry),
            strings(|r| r.experience),
            strings(|r| r.education),
            strings(|r| SATISFACTION[r.satisfaction]),
            strings(|r| MOTIVATION[r.motivation]),
            numbers(|r| r.satisfaction as i64 + 1),
            numbers(|r| r.motivation as i64 + 1),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut rng = SimpleRng::new(42);
    let responses = generate(200, &mut rng);
    log::info!("Generated {} responses (seed 42)", responses.len());

    write_csv("sample_survey.csv", &responses)?;
    log::info!("Wrote sample_survey.csv");
    write_parquet("sample_survey.parquet", &responses)?;
    log::info!("Wrote sample_survey.parquet");

    println!(
        "Wrote {} responses to sample_survey.csv and sample_survey.parquet",
        responses.len()
    );
    Ok(())
}
