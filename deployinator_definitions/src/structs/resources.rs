use inherit::Blank;

use super::Result;

/// Cpu and memory quantities in kubernetes notation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ResourceList {
    /// CPU string, e.g. `100m` or `2`
    pub cpu: String,
    /// Memory string, e.g. `512Mi` or `1Gi`
    pub memory: String,
}

impl ResourceList {
    pub fn new(cpu: &str, memory: &str) -> Self {
        ResourceList {
            cpu: cpu.into(),
            memory: memory.into(),
        }
    }

    /// Raw number of cores and bytes of memory
    pub fn normalised(&self) -> Result<(f64, f64)> {
        Ok((parse_cpu(&self.cpu)?, parse_memory(&self.memory)?))
    }
}

/// Kubernetes resource requests and limits for the main container
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceRequirements {
    pub requests: Option<ResourceList>,
    pub limits: Option<ResourceList>,
}

impl Blank for ResourceRequirements {
    fn is_blank(&self) -> bool {
        self.requests.is_none() && self.limits.is_none()
    }
}

impl ResourceRequirements {
    pub fn verify(&self) -> Result<()> {
        let req = self.requests.as_ref().map(ResourceList::normalised).transpose()?;
        let lim = self.limits.as_ref().map(ResourceList::normalised).transpose()?;

        // limits >= requests
        if let (Some((rcpu, rmem)), Some((lcpu, lmem))) = (req, lim) {
            if rcpu > lcpu {
                bail!("Requested more CPU than what was limited");
            }
            if rmem > lmem {
                bail!("Requested more memory than what was limited");
            }
        }
        // sanity numbers (based on the largest node pool)
        for (cpu, mem) in req.into_iter().chain(lim) {
            if cpu > 32.0 {
                bail!("Resources set to more than 32 cores");
            }
            if mem > 64.0 * 1024.0 * 1024.0 * 1024.0 {
                bail!("Resources set to more than 64 GB of memory");
            }
        }
        Ok(())
    }
}

// Parse normal k8s memory resource value into floats
pub fn parse_memory(s: &str) -> Result<f64> {
    let digits = s.chars().take_while(|ch| ch.is_ascii_digit() || *ch == '.').collect::<String>();
    let unit = s.chars().skip_while(|ch| ch.is_ascii_digit() || *ch == '.').collect::<String>();
    let mut res: f64 = digits.parse()?;
    trace!("Parsed {} ({})", digits, unit);
    match unit.as_str() {
        "Ki" => res *= 1024.0,
        "Mi" => res *= 1024.0 * 1024.0,
        "Gi" => res *= 1024.0 * 1024.0 * 1024.0,
        "k" => res *= 1000.0,
        "M" => res *= 1000.0 * 1000.0,
        "G" => res *= 1000.0 * 1000.0 * 1000.0,
        "" => {}
        _ => bail!("Unknown unit {}", unit),
    }
    Ok(res)
}

// Parse normal k8s cpu resource values into floats
// We don't allow power of two variants here
pub fn parse_cpu(s: &str) -> Result<f64> {
    let digits = s.chars().take_while(|ch| ch.is_ascii_digit() || *ch == '.').collect::<String>();
    let unit = s.chars().skip_while(|ch| ch.is_ascii_digit() || *ch == '.').collect::<String>();
    let mut res: f64 = digits.parse()?;
    trace!("Parsed {} ({})", digits, unit);
    match unit.as_str() {
        "m" => res /= 1000.0,
        "" => {}
        _ => bail!("Unknown unit {}", unit),
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::{parse_cpu, parse_memory, ResourceList, ResourceRequirements};

    #[test]
    fn parsing() {
        assert_eq!(parse_memory("1Gi").unwrap(), 1024.0 * 1024.0 * 1024.0);
        assert_eq!(parse_memory("512Mi").unwrap(), 512.0 * 1024.0 * 1024.0);
        assert_eq!(parse_memory("1k").unwrap(), 1000.0);
        assert_eq!(parse_cpu("100m").unwrap(), 0.1);
        assert_eq!(parse_cpu("2").unwrap(), 2.0);
        assert!(parse_cpu("2Gi").is_err());
        assert!(parse_memory("lots").is_err());
    }

    #[test]
    fn limits_above_requests() {
        let ok = ResourceRequirements {
            requests: Some(ResourceList::new("100m", "256Mi")),
            limits: Some(ResourceList::new("1", "1Gi")),
        };
        assert!(ok.verify().is_ok());
        let bad = ResourceRequirements {
            requests: Some(ResourceList::new("2", "256Mi")),
            limits: Some(ResourceList::new("1", "1Gi")),
        };
        assert!(bad.verify().is_err());
        let huge = ResourceRequirements {
            requests: Some(ResourceList::new("64", "1Gi")),
            limits: None,
        };
        assert!(huge.verify().is_err());
    }
}
