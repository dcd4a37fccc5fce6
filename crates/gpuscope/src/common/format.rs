/// Binary-prefix scaling for memory amounts reported by the scheduler in MiB.
///
/// Reports render a `free/total` pair with a single unit inferred from the
/// total, so both sides of the pair are scaled by the same factor.
#[derive(Debug, Clone, Copy)]
pub struct MemScale {
    factor: i64,
    pub unit: &'static str,
}

const UNITS: [&str; 5] = ["M", "G", "T", "P", "E"];

/// Picks the largest unit that keeps `total_mib` below 1024.
pub fn mem_scale_for(total_mib: i64) -> MemScale {
    let mut factor: i64 = 1;
    for unit in &UNITS[..UNITS.len() - 1] {
        if total_mib.abs() / factor < 1024 {
            return MemScale { factor, unit };
        }
        factor *= 1024;
    }
    MemScale {
        factor,
        unit: UNITS[UNITS.len() - 1],
    }
}

impl MemScale {
    pub fn apply(&self, mib: i64) -> i64 {
        mib / self.factor
    }
}

/// Renders a `free/total` memory pair in the unit of the total, e.g. `192/256G`.
/// A negative free amount (transiently inconsistent scheduler data) is kept.
pub fn format_mem_pair(free_mib: i64, total_mib: i64) -> String {
    let scale = mem_scale_for(total_mib);
    format!(
        "{}/{}{}",
        scale.apply(free_mib),
        scale.apply(total_mib),
        scale.unit
    )
}

/// Renders a single memory amount with an inferred unit, e.g. `512M` or `16G`.
pub fn format_mem(mib: i64) -> String {
    let scale = mem_scale_for(mib);
    format!("{}{}", scale.apply(mib), scale.unit)
}
