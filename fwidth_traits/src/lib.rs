//! Host collaborator seams for the filament width compensator.
//!
//! Everything the control loop needs from the motion host goes through these
//! traits: averaged ADC readings, the extruder position, and the extrusion
//! percentage directive.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// One analog input with hardware averaging already applied.
pub trait Adc {
    /// Block until the next averaged reading is ready or `timeout` expires.
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Motion subsystem view of the extruder axis.
pub trait Toolhead {
    /// Absolute extruder position in millimeters of filament fed.
    fn extruder_position(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;
}

/// Extrusion scaling directive on the host (`M221 S<percent>`).
pub trait ExtrusionScaler {
    fn set_extrude_factor(
        &mut self,
        percent: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: Toolhead + ?Sized> Toolhead for Box<T> {
    fn extruder_position(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        (**self).extruder_position()
    }
}

impl<X: ExtrusionScaler + ?Sized> ExtrusionScaler for Box<X> {
    fn set_extrude_factor(
        &mut self,
        percent: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_extrude_factor(percent)
    }
}

impl<A: Adc + ?Sized> Adc for Box<A> {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(timeout)
    }
}
