use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::simulation::{SimulationSummary, SpeciesTraits};

pub const TIMELINE_FILE: &str = "output.txt";
pub const SPECIES_FILE: &str = "molecules.txt";
pub const FINAL_FILE: &str = "final.txt";

/// Plain-text run history: per-tick species counts, new species and a final
/// summary, each in its own file under one directory.
#[derive(Debug, Clone)]
pub struct Recorder {
    dir: PathBuf,
}

impl Recorder {
    /// Create `dir` if needed and start every file empty.
    pub fn create(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let recorder = Self { dir: dir.into() };
        fs::create_dir_all(&recorder.dir)?;
        recorder.truncate()?;
        Ok(recorder)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn truncate(&self) -> io::Result<()> {
        for name in [TIMELINE_FILE, SPECIES_FILE, FINAL_FILE] {
            File::create(self.dir.join(name))?;
        }
        Ok(())
    }

    pub fn record_tick(
        &self,
        timestep: u64,
        population: usize,
        counts: &BTreeMap<u32, usize>,
    ) -> io::Result<()> {
        let mut line = format!("T-{timestep} | {population} molecules");
        for (species, count) in counts {
            let _ = write!(line, " | {species}: {count}");
        }
        line.push('\n');
        self.append(TIMELINE_FILE, &line)
    }

    pub fn record_species(&self, traits: &SpeciesTraits) -> io::Result<()> {
        self.append(
            SPECIES_FILE,
            &format!(
                "ID: {} | R: {:.2} - M: {:.2} - D: {:.2}\n",
                traits.species_id, traits.reproduction_rate, traits.mutation_rate, traits.death_rate
            ),
        )
    }

    pub fn record_final(&self, summary: &SimulationSummary) -> io::Result<()> {
        let winner = match summary.winner {
            Some((species, count)) => format!("Winner: Species {species} with {count} molecules!"),
            None => "Winner: none, the population is extinct".to_string(),
        };
        self.append(
            FINAL_FILE,
            &format!(
                "{winner}\nTotal molecules: {}\nTotal unique species: {}\nSurviving unique species: {}\n",
                summary.total_molecules, summary.total_species, summary.surviving_species
            ),
        )
    }

    fn append(&self, name: &str, text: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(name))?;
        file.write_all(text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("petri-recorder-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn writes_timeline_species_and_final_lines() {
        let dir = scratch_dir("lines");
        let recorder = Recorder::create(&dir).expect("create recorder");

        let counts = BTreeMap::from([(1, 3), (4, 1)]);
        recorder.record_tick(12, 4, &counts).unwrap();
        recorder
            .record_species(&SpeciesTraits {
                species_id: 4,
                reproduction_rate: 2.456,
                mutation_rate: 3.9,
                death_rate: 0.1,
            })
            .unwrap();
        recorder
            .record_final(&SimulationSummary {
                winner: Some((1, 3)),
                total_molecules: 4,
                total_species: 4,
                surviving_species: 2,
            })
            .unwrap();

        let read = |name: &str| fs::read_to_string(dir.join(name)).unwrap();
        assert_eq!(read(TIMELINE_FILE), "T-12 | 4 molecules | 1: 3 | 4: 1\n");
        assert_eq!(read(SPECIES_FILE), "ID: 4 | R: 2.46 - M: 3.90 - D: 0.10\n");
        assert_eq!(
            read(FINAL_FILE),
            "Winner: Species 1 with 3 molecules!\nTotal molecules: 4\nTotal unique species: 4\nSurviving unique species: 2\n"
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn truncate_empties_previous_run() {
        let dir = scratch_dir("truncate");
        let recorder = Recorder::create(&dir).unwrap();
        recorder.record_tick(1, 0, &BTreeMap::new()).unwrap();
        recorder.truncate().unwrap();
        assert_eq!(fs::read_to_string(dir.join(TIMELINE_FILE)).unwrap(), "");
        let _ = fs::remove_dir_all(&dir);
    }
}
