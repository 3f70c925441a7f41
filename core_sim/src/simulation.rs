//! Birth/death/mutation population model.
//!
//! Every tick an empty world may be seeded with one molecule of species 1;
//! survivors reproduce while the population is under the cap, and a child
//! occasionally mutates into a new species with drifted rates. Molecules
//! drift with a constant velocity and bounce off the viewport margins.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sim_proto::{MoleculeState, Snapshot};

const SEED_REPRODUCTION_RATE: f64 = 2.0;
const SEED_MUTATION_RATE: f64 = 4.0;
const SEED_DEATH_RATE: f64 = 1.0;
const MIN_RATE: f64 = 0.1;
const FIRST_SPECIES: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub molecule_limit: u32,
    pub spawn_rate: f64,
    pub variation: f64,
    pub speed: f64,
}

/// Parameters for [`Simulation::reset`]; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResetParams {
    pub molecule_limit: Option<u32>,
    pub spawn_rate: Option<f64>,
    pub variation: Option<f64>,
    pub seed: Option<u64>,
}

/// Percent chances that define a species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeciesTraits {
    pub species_id: u32,
    pub reproduction_rate: f64,
    pub mutation_rate: f64,
    pub death_rate: f64,
}

/// Fractional margins molecules bounce off, derived from the draw radius.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub margin_x: f64,
    pub margin_y: f64,
}

impl Bounds {
    pub fn from_viewport(width: u32, height: u32, radius_px: u32) -> Self {
        let margin = |extent: u32| {
            if extent == 0 {
                0.0
            } else {
                (f64::from(radius_px) / f64::from(extent)).min(0.5)
            }
        };
        Self {
            margin_x: margin(width),
            margin_y: margin(height),
        }
    }
}

#[derive(Debug, Clone)]
struct Molecule {
    entity_id: u64,
    traits: SpeciesTraits,
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
}

/// Species created during one tick, in creation order.
#[derive(Debug, Default)]
pub struct TickReport {
    pub new_species: Vec<SpeciesTraits>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSummary {
    /// Most populous species and its count; lowest id wins ties.
    pub winner: Option<(u32, usize)>,
    pub total_molecules: usize,
    pub total_species: u32,
    pub surviving_species: usize,
}

pub struct Simulation {
    params: SimulationParams,
    timestep: u64,
    current_species_id: u32,
    next_entity_id: u64,
    molecules: Vec<Molecule>,
    species_colour: HashMap<u32, String>,
    bounds: Bounds,
    rng: SmallRng,
}

impl Simulation {
    pub fn new(params: SimulationParams, seed: Option<u64>) -> Self {
        Self {
            params,
            timestep: 0,
            current_species_id: FIRST_SPECIES,
            next_entity_id: 1,
            molecules: Vec::new(),
            species_colour: HashMap::new(),
            bounds: Bounds::default(),
            rng: seeded_rng(seed),
        }
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    pub fn population(&self) -> usize {
        self.molecules.len()
    }

    pub fn current_species_id(&self) -> u32 {
        self.current_species_id
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    pub fn set_molecule_limit(&mut self, limit: u32) {
        self.params.molecule_limit = limit.max(1);
    }

    pub fn reset(&mut self, reset: ResetParams) {
        if let Some(seed) = reset.seed {
            self.rng = SmallRng::seed_from_u64(seed);
        }
        if let Some(limit) = reset.molecule_limit {
            self.params.molecule_limit = limit.max(1);
        }
        if let Some(spawn_rate) = reset.spawn_rate {
            self.params.spawn_rate = spawn_rate.max(0.0);
        }
        if let Some(variation) = reset.variation {
            self.params.variation = variation.max(0.0);
        }
        self.timestep = 0;
        self.current_species_id = FIRST_SPECIES;
        self.next_entity_id = 1;
        self.molecules.clear();
        self.species_colour.clear();
    }

    /// Advance one tick.
    pub fn step(&mut self) -> TickReport {
        let mut report = TickReport::default();
        self.timestep += 1;

        if self.molecules.is_empty() && self.roll() < self.params.spawn_rate {
            self.spawn_seed();
        }

        let reproduction_allowed = self.molecules.len() < self.params.molecule_limit as usize;

        let mut molecules = std::mem::take(&mut self.molecules);
        molecules.retain(|molecule| self.roll() >= molecule.traits.death_rate);

        if reproduction_allowed {
            let mut children = Vec::new();
            for parent in &molecules {
                if self.roll() >= parent.traits.reproduction_rate {
                    continue;
                }
                let traits = if self.roll() < parent.traits.mutation_rate {
                    let traits = self.mutate(&parent.traits);
                    report.new_species.push(traits);
                    traits
                } else {
                    parent.traits
                };
                let child = self.make_molecule(traits, parent.x, parent.y);
                children.push(child);
            }
            molecules.extend(children);
        }

        for molecule in &mut molecules {
            advance(molecule, self.bounds);
        }
        self.molecules = molecules;
        report
    }

    /// Current population as a wire snapshot without control fields.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            timestep: self.timestep,
            molecules: self
                .molecules
                .iter()
                .map(|molecule| MoleculeState {
                    entity_id: molecule.entity_id,
                    species_id: molecule.traits.species_id,
                    x: molecule.x,
                    y: molecule.y,
                    colour: self.species_colour.get(&molecule.traits.species_id).cloned(),
                })
                .collect(),
            paused: None,
            molecule_limit: None,
        }
    }

    pub fn species_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for molecule in &self.molecules {
            *counts.entry(molecule.traits.species_id).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> SimulationSummary {
        let counts = self.species_counts();
        let winner = counts
            .iter()
            .fold(None, |best: Option<(u32, usize)>, (&species, &count)| match best {
                Some((_, most)) if most >= count => best,
                _ => Some((species, count)),
            });
        SimulationSummary {
            winner,
            total_molecules: self.molecules.len(),
            total_species: self.current_species_id,
            surviving_species: counts.len(),
        }
    }

    fn roll(&mut self) -> f64 {
        self.rng.gen_range(0.0..100.0)
    }

    fn spawn_seed(&mut self) {
        let traits = SpeciesTraits {
            species_id: FIRST_SPECIES,
            reproduction_rate: SEED_REPRODUCTION_RATE,
            mutation_rate: SEED_MUTATION_RATE,
            death_rate: SEED_DEATH_RATE,
        };
        if !self.species_colour.contains_key(&FIRST_SPECIES) {
            let colour = self.random_colour();
            self.species_colour.insert(FIRST_SPECIES, colour);
        }
        let x = self.rng.gen_range(0.0..=1.0);
        let y = self.rng.gen_range(0.0..=1.0);
        let molecule = self.make_molecule(traits, x, y);
        self.molecules.push(molecule);
    }

    fn mutate(&mut self, parent: &SpeciesTraits) -> SpeciesTraits {
        self.current_species_id += 1;
        let species_id = self.current_species_id;
        let traits = SpeciesTraits {
            species_id,
            reproduction_rate: self.drift(parent.reproduction_rate),
            mutation_rate: self.drift(parent.mutation_rate),
            death_rate: self.drift(parent.death_rate),
        };
        let colour = self.random_colour();
        self.species_colour.insert(species_id, colour);
        traits
    }

    fn drift(&mut self, base: f64) -> f64 {
        let magnitude = self.rng.gen_range(0.0..=self.params.variation);
        let sign = if self.rng.gen::<bool>() { 1.0 } else { -1.0 };
        (base + magnitude * sign).max(MIN_RATE)
    }

    fn make_molecule(&mut self, traits: SpeciesTraits, x: f64, y: f64) -> Molecule {
        let speed = self.params.speed;
        let molecule = Molecule {
            entity_id: self.next_entity_id,
            traits,
            x,
            y,
            vx: self.rng.gen_range(-speed..=speed),
            vy: self.rng.gen_range(-speed..=speed),
        };
        self.next_entity_id += 1;
        molecule
    }

    fn random_colour(&mut self) -> String {
        format!("#{:06x}", self.rng.gen_range(0..=0x00FF_FFFFu32))
    }
}

fn seeded_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    }
}

fn advance(molecule: &mut Molecule, bounds: Bounds) {
    molecule.x += molecule.vx;
    molecule.y += molecule.vy;
    bounce(&mut molecule.x, &mut molecule.vx, bounds.margin_x);
    bounce(&mut molecule.y, &mut molecule.vy, bounds.margin_y);
}

fn bounce(position: &mut f64, velocity: &mut f64, margin: f64) {
    let low = margin;
    let high = 1.0 - margin;
    if *position < low {
        *position = low;
        *velocity = velocity.abs();
    } else if *position > high {
        *position = high;
        *velocity = -velocity.abs();
    }
}
