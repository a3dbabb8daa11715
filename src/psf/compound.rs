//! Composite models for PSF photometry.

use itertools::Itertools;
use log::debug;

use crate::error::{Error, Result};
use crate::psf::adapter::total_integral;
use crate::psf::{Parameter, Parameters, PsfModel};
use crate::quadrature::QuadratureOptions;

/// A PSF reduced to the three free parameters position and flux.
///
/// Created by [`prepare_psf_model`]. The parameter vector is the one of the
/// wrapped PSF, followed by the stages added by the preparation:
/// `x_offset`/`y_offset` (position of the PSF origin, if the PSF has no named
/// position parameters), `flux_scaling` (if it has no named flux) and
/// `renormalize_scaling` (fixed, with renormalization). Only the position
/// and flux parameters are free.
#[derive(Clone, Debug)]
pub struct PreparedPsf {
    psf: Box<dyn PsfModel>,
    x_offset: Option<usize>,
    y_offset: Option<usize>,
    flux_scaling: Option<usize>,
    renormalize_scaling: Option<usize>,
    xname: String,
    yname: String,
    fluxname: String,
    parameters: Parameters,
}

/// Prepare a PSF for fitting positions and fluxes.
///
/// `xname`, `yname` and `fluxname` name the parameters of `psf` that hold the
/// center and the flux. Missing ones are replaced by an offset or a scaling
/// stage. All other parameters are fixed. With `renormalize`, the PSF is
/// integrated over the plane once and scaled to unit total.
///
/// Offsets are positions: the prepared model evaluates the wrapped PSF at
/// `(x - x_offset, y - y_offset)`, so a star at `(5, 3)` has `x_offset = 5`
/// and `y_offset = 3`. A shift stage that adds the offset to the coordinates
/// needs the opposite sign.
///
/// Aliases `x_0`, `y_0` and `flux` are added unless the names already exist.
pub fn prepare_psf_model(
    psf: &dyn PsfModel,
    xname: Option<&str>,
    yname: Option<&str>,
    fluxname: Option<&str>,
    renormalize: bool,
) -> Result<PreparedPsf> {
    let psf = psf.clone_box();
    for name in [xname, yname, fluxname].into_iter().flatten() {
        if !psf.parameters().contains(name) {
            return Err(Error::UnknownParameter(name.to_string()));
        }
    }

    let mut parameters = Parameters::new(
        psf.parameters()
            .iter()
            .map(|p| Parameter::fixed(p.name.clone(), p.value))
            .collect(),
    );
    let mut stage = |name: &str, value: f64, fixed: bool| {
        parameters.push(Parameter {
            name: name.to_string(),
            value,
            fixed,
        });
        parameters.len() - 1
    };

    let x_offset = xname.is_none().then(|| stage("x_offset", 0., false));
    let y_offset = yname.is_none().then(|| stage("y_offset", 0., false));
    let flux_scaling = fluxname.is_none().then(|| stage("flux_scaling", 1., false));
    let renormalize_scaling = if renormalize {
        let integral = total_integral(
            psf.as_ref(),
            &psf.parameters().values(),
            &QuadratureOptions::default(),
        )?;
        debug!("PSF integrates to {integral}.");
        Some(stage("renormalize_scaling", 1. / integral, true))
    } else {
        None
    };

    let xname = xname.unwrap_or("x_offset").to_string();
    let yname = yname.unwrap_or("y_offset").to_string();
    let fluxname = fluxname.unwrap_or("flux_scaling").to_string();
    for name in [&xname, &yname, &fluxname] {
        parameters.set_fixed(name, false)?;
    }

    if !parameters.contains("x_0") && !parameters.contains("y_0") {
        parameters.add_alias("x_0", &xname)?;
        parameters.add_alias("y_0", &yname)?;
    }
    if !parameters.contains("flux") {
        parameters.add_alias("flux", &fluxname)?;
    }

    Ok(PreparedPsf {
        psf,
        x_offset,
        y_offset,
        flux_scaling,
        renormalize_scaling,
        xname,
        yname,
        fluxname,
        parameters,
    })
}

impl PreparedPsf {
    /// The wrapped PSF, with the parameter values it had when it was prepared.
    pub fn psf(&self) -> &dyn PsfModel {
        self.psf.as_ref()
    }

    /// Name of the free x position parameter.
    pub fn xname(&self) -> &str {
        &self.xname
    }

    /// Name of the free y position parameter.
    pub fn yname(&self) -> &str {
        &self.yname
    }

    /// Name of the free flux parameter.
    pub fn fluxname(&self) -> &str {
        &self.fluxname
    }
}

impl PsfModel for PreparedPsf {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn value(&self, x: f64, y: f64, params: &[f64]) -> f64 {
        let n = self.psf.parameters().len();
        let x = self.x_offset.map_or(x, |idx| x - params[idx]);
        let y = self.y_offset.map_or(y, |idx| y - params[idx]);

        let scale = [self.flux_scaling, self.renormalize_scaling]
            .into_iter()
            .flatten()
            .map(|idx| params[idx])
            .product::<f64>();
        scale * self.psf.value(x, y, &params[..n])
    }

    fn clone_box(&self) -> Box<dyn PsfModel> {
        Box::new(self.clone())
    }
}

/// One source of a star group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Star {
    /// Center along x.
    pub x_0: f64,
    /// Center along y.
    pub y_0: f64,
    /// Total flux.
    pub flux: f64,
}

/// Sum of independent copies of a template PSF, one per star.
///
/// Parameters of the `i`-th copy carry the suffix `_i`, e.g. `x_0_1`.
#[derive(Clone, Debug)]
pub struct GroupedPsf {
    template: Box<dyn PsfModel>,
    n_sources: usize,
    parameters: Parameters,
}

/// Build the joint model of a group of stars from a template.
///
/// The template must have parameters named `x_0`, `y_0` and `flux`. Its
/// other parameters and all fixed flags are copied to every source.
pub fn grouped_psf_model(template: &dyn PsfModel, stars: &[Star]) -> Result<GroupedPsf> {
    if stars.is_empty() {
        return Err(Error::EmptyStarGroup);
    }

    let mut parameters = Parameters::default();
    for (i, star) in stars.iter().enumerate() {
        let mut source = template.parameters().clone();
        source.set("x_0", star.x_0)?;
        source.set("y_0", star.y_0)?;
        source.set("flux", star.flux)?;
        for p in source.iter() {
            parameters.push(Parameter {
                name: format!("{}_{i}", p.name),
                ..p.clone()
            });
        }
    }

    Ok(GroupedPsf {
        template: template.clone_box(),
        n_sources: stars.len(),
        parameters,
    })
}

impl GroupedPsf {
    /// Number of stars in the group.
    pub fn n_sources(&self) -> usize {
        self.n_sources
    }

    /// Names of the parameters of star `i`, in template order.
    pub fn source_parameter_names(&self, i: usize) -> Vec<String> {
        self.template
            .parameters()
            .names()
            .into_iter()
            .map(|name| format!("{name}_{i}"))
            .collect_vec()
    }

    /// A standalone copy of the model of star `i` with its current parameters.
    pub fn source(&self, i: usize) -> Option<Box<dyn PsfModel>> {
        let n = self.template.parameters().len();
        if i >= self.n_sources {
            return None;
        }
        let mut source = self.template.clone_box();
        let values = self.parameters.values();
        source
            .parameters_mut()
            .set_values(&values[i * n..(i + 1) * n])
            .ok()?;
        Some(source)
    }
}

impl PsfModel for GroupedPsf {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn value(&self, x: f64, y: f64, params: &[f64]) -> f64 {
        let n = self.template.parameters().len();
        params
            .chunks(n)
            .take(self.n_sources)
            .map(|source| self.template.value(x, y, source))
            .sum()
    }

    fn clone_box(&self) -> Box<dyn PsfModel> {
        Box::new(self.clone())
    }
}
