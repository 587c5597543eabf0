use std::ops::Deref;

/// A plugin the session either created itself or was lent by the caller.
///
/// Dropping an `Owned` handle tears the plugin down; a `Borrowed` one leaves
/// it to its owner.
pub enum PluginHandle<'p, P> {
    Owned(P),
    Borrowed(&'p P),
}

impl<P> PluginHandle<'_, P> {
    pub fn is_owned(&self) -> bool {
        matches!(self, PluginHandle::Owned(_))
    }

    /// Returns the plugin if the session owns it.
    pub fn into_owned(self) -> Option<P> {
        match self {
            PluginHandle::Owned(p) => Some(p),
            PluginHandle::Borrowed(_) => None,
        }
    }
}

impl<P> Deref for PluginHandle<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        match self {
            PluginHandle::Owned(p) => p,
            PluginHandle::Borrowed(p) => p,
        }
    }
}
