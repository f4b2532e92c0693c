//! Particle names known to the FEI, their PDG codes and charge conjugates.

/// `(particle, antiparticle, pdg code of the particle)`. Self-conjugate
/// particles list their own name twice.
const TABLE: &[(&str, &str, i32)] = &[
    ("e-", "e+", 11),
    ("mu-", "mu+", 13),
    ("gamma", "gamma", 22),
    ("pi0", "pi0", 111),
    ("K_L0", "K_L0", 130),
    ("pi+", "pi-", 211),
    ("K_S0", "K_S0", 310),
    ("K+", "K-", 321),
    ("D+", "D-", 411),
    ("D*+", "D*-", 413),
    ("D0", "anti-D0", 421),
    ("D*0", "anti-D*0", 423),
    ("D_s+", "D_s-", 431),
    ("D_s*+", "D_s*-", 433),
    ("J/psi", "J/psi", 443),
    ("B0", "anti-B0", 511),
    ("B+", "B-", 521),
    ("B_s0", "anti-B_s0", 531),
    ("p+", "anti-p-", 2212),
    ("Lambda0", "anti-Lambda0", 3122),
    ("Sigma+", "anti-Sigma-", 3222),
    ("Lambda_c+", "anti-Lambda_c-", 4122),
];

/// Signed PDG code of a particle name, negative for antiparticles.
pub fn from_name(name: &str) -> Option<i32> {
    TABLE.iter().find_map(|&(particle, anti, code)| {
        if particle == name {
            Some(code)
        } else if anti == name {
            Some(-code)
        } else {
            None
        }
    })
}

/// Name of the charge conjugated particle. Self-conjugate and unknown
/// names are returned unchanged.
pub fn conjugate(name: &str) -> &str {
    TABLE
        .iter()
        .find_map(|&(particle, anti, _)| {
            if particle == name {
                Some(anti)
            } else if anti == name {
                Some(particle)
            } else {
                None
            }
        })
        .unwrap_or(name)
}

/// Identifier of the charge conjugated list, `name:label` -> `conj(name):label`.
pub fn conjugate_identifier(identifier: &str) -> String {
    match identifier.split_once(':') {
        Some((name, label)) => format!("{}:{}", conjugate(name), label),
        None => conjugate(identifier).to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(from_name("e+"), Some(-11));
        assert_eq!(from_name("B+"), Some(521));
        assert_eq!(from_name("anti-D0"), Some(-421));
        assert_eq!(from_name("X+"), None);
    }

    #[test]
    fn test_conjugates() {
        assert_eq!(conjugate("K+"), "K-");
        assert_eq!(conjugate("anti-Lambda_c-"), "Lambda_c+");
        assert_eq!(conjugate("pi0"), "pi0");
        assert_eq!(conjugate("J/psi"), "J/psi");
        assert_eq!(conjugate_identifier("D*+:generic"), "D*-:generic");
        assert_eq!(conjugate_identifier("gamma:FSP"), "gamma:FSP");
    }
}
