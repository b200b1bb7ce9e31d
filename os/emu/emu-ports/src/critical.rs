use crate::error::Fatal;

/// Non-reentrant guard marking a multi-write device sequence.
///
/// While held, a standard write that finds its port unavailable is fatal
/// instead of being swallowed. Entering while already held is fatal too.
/// Both fatal paths release the guard before reporting.
#[derive(Debug, Default)]
pub struct CriticalSection {
    depth: u32,
    holder: Option<&'static str>,
}

impl CriticalSection {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            depth: 0,
            holder: None,
        }
    }

    /// # Errors
    /// [`Fatal::CriticalSectionConflict`] if the guard is already held.
    pub fn enter(&mut self, label: &'static str) -> Result<(), Fatal> {
        if self.depth > 0 {
            let held = self.holder.unwrap_or("unknown");
            self.reset();
            return Err(Fatal::CriticalSectionConflict {
                held,
                requested: label,
            });
        }
        self.depth += 1;
        self.holder = Some(label);
        Ok(())
    }

    /// # Errors
    /// [`Fatal::LeaveWithoutEnter`] if the guard is not held.
    pub fn leave(&mut self) -> Result<(), Fatal> {
        if self.depth == 0 {
            return Err(Fatal::LeaveWithoutEnter);
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.holder = None;
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.depth > 0
    }

    #[inline]
    #[must_use]
    pub const fn holder(&self) -> Option<&'static str> {
        self.holder
    }

    /// Reports a write to an unavailable port.
    ///
    /// # Errors
    /// [`Fatal::CriticalPortUnavailable`] if the guard is held.
    pub fn check_unavailable_write(&mut self, port: u16, operation: &'static str) -> Result<(), Fatal> {
        if self.depth == 0 {
            return Ok(());
        }
        let holder = self.holder.unwrap_or("unknown");
        self.reset();
        Err(Fatal::CriticalPortUnavailable {
            port,
            operation,
            holder,
        })
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.holder = None;
    }
}
