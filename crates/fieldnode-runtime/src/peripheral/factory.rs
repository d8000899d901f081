use indexmap::IndexMap;

use tracing::{debug, warn};

use fieldnode::parameters::Parameters;

use crate::error::{Error, Result};

use super::{Capability, InvalidPeripheral, PeripheralEnv, PeripheralRef, shared};

/// A function building a peripheral from its parameters.
pub type PeripheralConstructor = fn(&Parameters<'_>, &PeripheralEnv<'_>) -> Result<PeripheralRef>;

#[derive(Debug, Clone, Copy)]
struct Registration {
    constructor: PeripheralConstructor,
    capabilities: &'static [Capability],
}

/// The table of peripheral constructors, indexed by type name.
///
/// Every type name is registered once at startup, before any command is
/// processed. Registration order is preserved.
#[derive(Debug, Clone, Default)]
pub struct PeripheralFactory {
    registrations: IndexMap<&'static str, Registration>,
}

impl PeripheralFactory {
    /// Creates an empty [`PeripheralFactory`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under a type name, together with the
    /// capabilities its peripherals implement.
    ///
    /// Returns `false` and keeps the existing registration when the type
    /// name is already taken.
    pub fn register(
        &mut self,
        type_name: &'static str,
        capabilities: &'static [Capability],
        constructor: PeripheralConstructor,
    ) -> bool {
        if self.registrations.contains_key(type_name) {
            warn!("Peripheral type `{type_name}` is already registered");
            return false;
        }

        let _ = self.registrations.insert(
            type_name,
            Registration {
                constructor,
                capabilities,
            },
        );
        debug!("Registered peripheral type `{type_name}`");
        true
    }

    /// Builds a peripheral from its parameters.
    ///
    /// A missing or unknown type, or a failing constructor, produces an
    /// [`InvalidPeripheral`] carrying the reason.
    #[must_use]
    pub fn create(&self, parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> PeripheralRef {
        match self.build(parameters, env) {
            Ok(peripheral) => peripheral,
            Err(e) => shared(InvalidPeripheral::new(e)),
        }
    }

    /// Returns the registered type names, in registration order.
    pub fn factory_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.registrations.keys().copied()
    }

    /// Returns the capabilities declared for a type name.
    #[must_use]
    pub fn capabilities(&self, type_name: &str) -> Option<&'static [Capability]> {
        self.registrations
            .get(type_name)
            .map(|registration| registration.capabilities)
    }

    fn build(&self, parameters: &Parameters<'_>, env: &PeripheralEnv<'_>) -> Result<PeripheralRef> {
        let type_name = parameters.type_name()?;
        let registration = self
            .registrations
            .get(type_name)
            .ok_or_else(|| Error::construction(format!("Unknown peripheral type: {type_name}")))?;

        let peripheral = (registration.constructor)(parameters, env)?;
        debug_assert!(
            Capability::ALL.into_iter().all(|capability| {
                peripheral.borrow_mut().supports(capability)
                    == registration.capabilities.contains(&capability)
            }),
            "{type_name} does not implement the capabilities it was registered with"
        );
        Ok(peripheral)
    }
}
