//! Named model parameters with fixed/free flags.

use itertools::Itertools;

use crate::error::{Error, Result};

/// A single named scalar parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// Name of the parameter.
    pub name: String,
    /// Current value.
    pub value: f64,
    /// Whether a fitter must leave this parameter untouched.
    pub fixed: bool,
}

impl Parameter {
    /// A free parameter.
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            fixed: false,
        }
    }

    /// A parameter that is held fixed during fitting.
    pub fn fixed(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            fixed: true,
        }
    }
}

/// Ordered set of named parameters owned by one model instance.
///
/// The order defines the layout of the parameter slices handed to
/// [`PsfModel::value`](crate::PsfModel::value). Aliases are alternative names
/// that resolve to the same slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameters {
    params: Vec<Parameter>,
    aliases: Vec<(String, usize)>,
}

impl Parameters {
    /// Create a parameter set from an ordered list.
    pub fn new(params: Vec<Parameter>) -> Self {
        Self {
            params,
            aliases: Vec::new(),
        }
    }

    /// Number of parameters (aliases not counted).
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate over the parameters in order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Parameter names in order.
    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Parameter values in order.
    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    /// Index of a parameter by name or alias.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params
            .iter()
            .position(|p| p.name == name)
            .or_else(|| {
                self.aliases
                    .iter()
                    .find(|(alias, _)| alias == name)
                    .map(|(_, idx)| *idx)
            })
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))
    }

    /// Whether a parameter (or alias) of this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Value of a parameter.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|idx| self.params[idx].value)
    }

    /// Set the value of a parameter.
    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        let idx = self.slot(name)?;
        self.params[idx].value = value;
        Ok(())
    }

    /// Whether a parameter is held fixed.
    pub fn is_fixed(&self, name: &str) -> Result<bool> {
        Ok(self.params[self.slot(name)?].fixed)
    }

    /// Fix or free a parameter.
    pub fn set_fixed(&mut self, name: &str, fixed: bool) -> Result<()> {
        let idx = self.slot(name)?;
        self.params[idx].fixed = fixed;
        Ok(())
    }

    /// Register `alias` as an alternative name for `target`.
    pub fn add_alias(&mut self, alias: impl Into<String>, target: &str) -> Result<()> {
        let idx = self.slot(target)?;
        self.aliases.push((alias.into(), idx));
        Ok(())
    }

    /// Names of all aliases and the parameters they resolve to.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, idx)| (alias.as_str(), self.params[*idx].name.as_str()))
    }

    /// Names of the free parameters in order.
    pub fn free_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| !p.fixed)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Values of the free parameters in order.
    pub fn free_values(&self) -> Vec<f64> {
        self.params
            .iter()
            .filter(|p| !p.fixed)
            .map(|p| p.value)
            .collect()
    }

    /// Overwrite the free parameters, in order, leaving fixed ones untouched.
    pub fn set_free_values(&mut self, values: &[f64]) -> Result<()> {
        let expected = self.params.iter().filter(|p| !p.fixed).count();
        if values.len() != expected {
            return Err(Error::ParameterCount {
                expected,
                found: values.len(),
            });
        }
        self.params
            .iter_mut()
            .filter(|p| !p.fixed)
            .zip_eq(values)
            .for_each(|(p, v)| p.value = *v);
        Ok(())
    }

    /// Overwrite all parameter values in order.
    pub fn set_values(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.params.len() {
            return Err(Error::ParameterCount {
                expected: self.params.len(),
                found: values.len(),
            });
        }
        self.params
            .iter_mut()
            .zip_eq(values)
            .for_each(|(p, v)| p.value = *v);
        Ok(())
    }

    /// Expand a vector of free values into a full parameter vector.
    pub fn with_free_values(&self, free: &[f64]) -> Result<Vec<f64>> {
        let mut clone = self.clone();
        clone.set_free_values(free)?;
        Ok(clone.values())
    }

    pub(crate) fn push(&mut self, param: Parameter) {
        self.params.push(param);
    }

    /// Write the value at a position of the model's own layout.
    pub(crate) fn set_at(&mut self, idx: usize, value: f64) {
        self.params[idx].value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Parameters {
        Parameters::new(vec![
            Parameter::new("flux", 2.),
            Parameter::new("x_0", 0.5),
            Parameter::new("y_0", -0.5),
            Parameter::fixed("sigma", 1.),
        ])
    }

    #[test]
    fn lookup() {
        let p = params();
        assert_eq!(p.names(), vec!["flux", "x_0", "y_0", "sigma"]);
        assert_eq!(p.get("x_0"), Some(0.5));
        assert_eq!(p.get("z_0"), None);
        assert_eq!(p.index_of("sigma"), Some(3));
    }

    #[test]
    fn set_by_index() {
        let mut p = params();
        p.set_at(3, 2.5);
        assert_eq!(p.get("sigma"), Some(2.5));
        assert_eq!(p.is_fixed("sigma"), Ok(true));
    }

    #[test]
    fn free_and_fixed() {
        let mut p = params();
        assert_eq!(p.free_names(), vec!["flux", "x_0", "y_0"]);

        p.set_free_values(&[3., 1., 2.]).unwrap();
        assert_eq!(p.values(), vec![3., 1., 2., 1.]);

        p.set_fixed("sigma", false).unwrap();
        assert_eq!(p.free_values(), vec![3., 1., 2., 1.]);
        assert!(!p.is_fixed("sigma").unwrap());
    }

    #[test]
    fn wrong_count() {
        let mut p = params();
        assert_eq!(
            p.set_free_values(&[1.]),
            Err(Error::ParameterCount {
                expected: 3,
                found: 1
            })
        );
    }

    #[test]
    fn unknown_name() {
        let mut p = params();
        assert_eq!(
            p.set("amplitude", 1.),
            Err(Error::UnknownParameter("amplitude".to_string()))
        );
    }

    #[test]
    fn aliases_share_storage() {
        let mut p = params();
        p.add_alias("amplitude", "flux").unwrap();
        p.set("amplitude", 7.).unwrap();

        assert_eq!(p.get("flux"), Some(7.));
        assert_eq!(p.len(), 4);
        assert_eq!(p.aliases().collect::<Vec<_>>(), vec![("amplitude", "flux")]);
    }
}
