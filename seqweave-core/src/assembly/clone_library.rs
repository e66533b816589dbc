//! Insert size statistics of paired-read libraries

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneLibraryInfo {
    pub name: String,
    pub mean_length_of_insert: f64,
    pub standard_deviation: f64,
}

/// Registry of clone libraries, looked up by case-insensitive name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CloneLibrary {
    libraries: Vec<CloneLibraryInfo>,
}

impl CloneLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// The 2K, 10K and 50K libraries, each with a deviation of a tenth of
    /// its mean
    pub fn with_defaults() -> Self {
        let libraries = [("2K", 2000.0), ("10K", 10000.0), ("50K", 50000.0)]
            .into_iter()
            .map(|(name, mean)| CloneLibraryInfo {
                name: name.to_string(),
                mean_length_of_insert: mean,
                standard_deviation: mean / 10.0,
            })
            .collect();
        Self { libraries }
    }

    /// Add or replace a library
    pub fn register(&mut self, name: &str, mean: f64, standard_deviation: f64) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_argument("clone library name is empty"));
        }
        if !mean.is_finite() || mean < 0.0 {
            return Err(Error::invalid_argument(format!(
                "clone library {}: invalid mean insert length {}",
                name, mean
            )));
        }
        if !standard_deviation.is_finite() || standard_deviation < 0.0 {
            return Err(Error::invalid_argument(format!(
                "clone library {}: invalid standard deviation {}",
                name, standard_deviation
            )));
        }
        let info = CloneLibraryInfo {
            name: name.to_string(),
            mean_length_of_insert: mean,
            standard_deviation,
        };
        match self
            .libraries
            .iter_mut()
            .find(|l| l.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => *existing = info,
            None => self.libraries.push(info),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CloneLibraryInfo> {
        let name = name.trim();
        self.libraries
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
    }

    pub fn libraries(&self) -> &[CloneLibraryInfo] {
        &self.libraries
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Register every `name,mean,sd` line of `text`. Blank lines and lines
    /// starting with `#` are skipped.
    pub fn parse(&mut self, text: &str) -> Result<()> {
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let [name, mean, sd] = fields.as_slice() else {
                return Err(Error::format(
                    number + 1,
                    format!("expected name,mean,sd but found {} fields", fields.len()),
                ));
            };
            let mean: f64 = mean
                .parse()
                .map_err(|_| Error::format(number + 1, format!("invalid mean '{}'", mean)))?;
            let sd: f64 = sd
                .parse()
                .map_err(|_| Error::format(number + 1, format!("invalid deviation '{}'", sd)))?;
            self.register(name, mean, sd)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let libraries = CloneLibrary::with_defaults();
        assert_eq!(libraries.len(), 3);
        let lib = libraries.get("10k").unwrap();
        assert_eq!(lib.mean_length_of_insert, 10000.0);
        assert_eq!(lib.standard_deviation, 1000.0);
        assert!(libraries.get("5K").is_none());
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut libraries = CloneLibrary::with_defaults();
        libraries.register("2k", 2500.0, 100.0).unwrap();
        assert_eq!(libraries.len(), 3);
        assert_eq!(libraries.get("2K").unwrap().mean_length_of_insert, 2500.0);
    }

    #[test]
    fn test_register_rejects_bad_values() {
        let mut libraries = CloneLibrary::new();
        assert!(libraries.register("", 100.0, 10.0).is_err());
        assert!(libraries.register("lib", -1.0, 10.0).is_err());
        assert!(libraries.register("lib", f64::NAN, 10.0).is_err());
        assert!(libraries.register("lib", 100.0, f64::INFINITY).is_err());
        assert!(libraries.is_empty());
    }

    #[test]
    fn test_parse() {
        let mut libraries = CloneLibrary::new();
        libraries
            .parse("# name,mean,sd\n0.5K, 500, 50\n\n3K,3000,300\n")
            .unwrap();
        assert_eq!(libraries.len(), 2);
        assert_eq!(libraries.get("0.5k").unwrap().standard_deviation, 50.0);

        let err = libraries.parse("4K,4000\n").unwrap_err();
        assert!(matches!(err, Error::Format { line: 1, .. }));
        let err = libraries.parse("ok,1,1\n4K,lots,1\n").unwrap_err();
        assert!(matches!(err, Error::Format { line: 2, .. }));
    }
}
