//! Constants and configuration values for hw-tagger
//!
//! Centralizes all magic numbers and defaults.

/// Label key constraints imposed by the label store
pub mod labels {
    /// Maximum length of the name segment of a label key
    pub const MAX_NAME_LEN: usize = 63;

    /// Length of the hash suffix appended to truncated names
    pub const HASH_SUFFIX_LEN: usize = 5;

    /// Value written for every label backed by a present device
    pub const PRESENT_VALUE: &str = "present";
}

/// Watch pipeline tuning
pub mod watch {
    /// Capacity of the queue between the event source and the orchestrator
    pub const SIGNAL_QUEUE_CAPACITY: usize = 10;
}

/// Built-in scope used when no configuration file is given
pub mod defaults {
    pub const LABEL_PREFIX: &str = "node-devices.alpha.kubernetes.io";

    pub const SUBSYSTEM: &str = "block";

    pub const DEVTYPE: &str = "disk";

    // ID_SERIAL and DM_UUID are too long to be useful, DM_NAME also
    // catches LVM volumes such as container pools.
    pub const IDENTIFIERS: &[(&str, &str)] = &[("wwn", "ID_WWN"), ("sn", "ID_SERIAL_SHORT")];
}
