//! The static device catalog.
//!
//! Units that predate the protocol array (A001) can only be identified by
//! product id and software version.  This table maps those onto protocol
//! stacks; whenever a device does send a protocol array, that array wins
//! and the table is never consulted.

use crate::capability::{ProtocolSet, Role};
use crate::command::CommandProto;
use tracing::*;

/// One row of the catalog.
#[derive(Debug)]
pub struct CatalogEntry {
    /// Family name, for diagnostics only.
    pub name: &'static str,
    pub product_ids: &'static [u16],
    /// Inclusive software-version bounds, in hundredths.
    /// `(0, u16::MAX)` means any version.
    pub software: (u16, u16),
    /// Which link the family ships with: 1 for serial L001, 2 for USB
    /// L002.  A hint only; the caller chooses the transport.
    pub link: u16,
    pub command: CommandProto,
    pub stacks: &'static [(Role, u16, &'static [u16])],
    /// Highest baud rate the family accepts, where known.
    pub max_baud: Option<u32>,
}

impl CatalogEntry {
    fn matches(&self, product_id: u16, software_version: u16) -> bool {
        self.product_ids.contains(&product_id)
            && software_version >= self.software.0
            && software_version <= self.software.1
    }

    pub fn protocol_set(&self) -> ProtocolSet {
        ProtocolSet::from_catalog(self.command, self.stacks)
    }
}

const ANY: (u16, u16) = (0, u16::MAX);

use Role::*;

/// The stack every unit too old to name itself is assumed to speak.
pub const FALLBACK: CatalogEntry = CatalogEntry {
    name: "pre-A001 default",
    product_ids: &[],
    software: ANY,
    link: 1,
    command: CommandProto::A010,
    stacks: &[(Waypoints, 100, &[100])],
    max_baud: None,
};

/// Product ids above this are too new to guess at; they must negotiate.
pub const FALLBACK_ID_LIMIT: u16 = 0x100;

static DEVICES: &[CatalogEntry] = &[
    CatalogEntry {
        name: "GPS 50/55/65/75/85/95",
        product_ids: &[7, 13, 14, 18, 22, 23, 24, 25, 35, 42],
        software: ANY,
        link: 1,
        command: CommandProto::A010,
        stacks: &[
            (Waypoints, 100, &[100]),
            (Routes, 200, &[200, 100]),
            (Tracks, 300, &[300]),
            (Almanac, 500, &[500]),
            (DateTime, 600, &[600]),
            (PositionInit, 700, &[700]),
        ],
        max_baud: Some(9600),
    },
    CatalogEntry {
        name: "GNC 250 / GPS 150 panel mounts",
        product_ids: &[20, 52, 64, 98],
        software: ANY,
        link: 1,
        command: CommandProto::A011,
        stacks: &[
            (Waypoints, 100, &[101]),
            (Routes, 200, &[201, 101]),
            (Proximity, 400, &[400]),
            (Almanac, 500, &[500]),
            (DateTime, 600, &[600]),
        ],
        max_baud: Some(9600),
    },
    CatalogEntry {
        name: "GPS 38/40/45/90 and GPS II",
        product_ids: &[31, 41, 45, 47, 56, 59, 61, 62],
        software: ANY,
        link: 1,
        command: CommandProto::A010,
        stacks: &[
            (Waypoints, 100, &[100]),
            (Routes, 200, &[201, 100]),
            (Tracks, 300, &[300]),
            (Almanac, 500, &[500]),
            (DateTime, 600, &[600]),
            (PositionInit, 700, &[700]),
        ],
        max_baud: Some(9600),
    },
    CatalogEntry {
        name: "GPS II Plus / GPS III",
        product_ids: &[71, 72, 73],
        software: ANY,
        link: 1,
        command: CommandProto::A010,
        stacks: &[
            (Waypoints, 100, &[103]),
            (Routes, 200, &[201, 103]),
            (Tracks, 300, &[300]),
            (Almanac, 500, &[501]),
            (DateTime, 600, &[600]),
            (PositionInit, 700, &[700]),
        ],
        max_baud: Some(9600),
    },
    // The GPS 12 family changed record formats across firmware revisions;
    // the version ranges below must stay in this order.
    CatalogEntry {
        name: "GPS 12/12XL (firmware < 3.01)",
        product_ids: &[77],
        software: (0, 300),
        link: 1,
        command: CommandProto::A010,
        stacks: &[
            (Waypoints, 100, &[100]),
            (Routes, 200, &[200, 100]),
            (Tracks, 300, &[300]),
            (Almanac, 500, &[500]),
            (DateTime, 600, &[600]),
            (PositionInit, 700, &[700]),
        ],
        max_baud: Some(9600),
    },
    CatalogEntry {
        name: "GPS 12/12XL (firmware 3.01-3.49)",
        product_ids: &[77],
        software: (301, 349),
        link: 1,
        command: CommandProto::A010,
        stacks: &[
            (Waypoints, 100, &[103]),
            (Routes, 200, &[201, 103]),
            (Tracks, 300, &[300]),
            (Proximity, 400, &[403]),
            (Almanac, 500, &[501]),
            (DateTime, 600, &[600]),
            (PositionInit, 700, &[700]),
        ],
        max_baud: Some(9600),
    },
    CatalogEntry {
        name: "GPS 12/12XL (firmware 3.50+)",
        product_ids: &[77],
        software: (350, u16::MAX),
        link: 1,
        command: CommandProto::A010,
        stacks: &[
            (Waypoints, 100, &[104]),
            (Routes, 200, &[201, 104]),
            (Tracks, 300, &[300]),
            (Proximity, 400, &[403]),
            (Almanac, 500, &[501]),
            (DateTime, 600, &[600]),
            (PositionInit, 700, &[700]),
        ],
        max_baud: Some(9600),
    },
    CatalogEntry {
        name: "GPS 12XL variants / GPS 126/128",
        product_ids: &[87, 95, 96, 100, 105, 106],
        software: ANY,
        link: 1,
        command: CommandProto::A010,
        stacks: &[
            (Waypoints, 100, &[104]),
            (Routes, 200, &[201, 104]),
            (Tracks, 300, &[300]),
            (Proximity, 400, &[403]),
            (Almanac, 500, &[501]),
            (DateTime, 600, &[600]),
            (PositionInit, 700, &[700]),
        ],
        max_baud: Some(9600),
    },
    CatalogEntry {
        name: "GPS 92",
        product_ids: &[112],
        software: ANY,
        link: 1,
        command: CommandProto::A011,
        stacks: &[
            (Waypoints, 100, &[101]),
            (Routes, 200, &[201, 101]),
            (Almanac, 500, &[500]),
            (DateTime, 600, &[600]),
        ],
        max_baud: Some(9600),
    },
    CatalogEntry {
        name: "eTrex / eMap / GPSMAP 76 era",
        product_ids: &[119, 120, 126, 128, 130, 136, 138, 141, 154, 169],
        software: ANY,
        link: 1,
        command: CommandProto::A010,
        stacks: &[
            (Waypoints, 100, &[108]),
            (Routes, 201, &[202, 108, 210]),
            (Tracks, 301, &[310, 301]),
            (Proximity, 400, &[403]),
            (Almanac, 500, &[501]),
            (DateTime, 600, &[600]),
            (PositionInit, 700, &[700]),
            (Pvt, 800, &[800]),
        ],
        max_baud: Some(115_200),
    },
];

/// Find the first matching row.  Later rows that also match are reported
/// but never used.
pub fn lookup(product_id: u16, software_version: u16) -> Option<&'static CatalogEntry> {
    let mut found: Option<&'static CatalogEntry> = None;
    for entry in DEVICES {
        if entry.matches(product_id, software_version) {
            match found {
                None => found = Some(entry),
                Some(first) => {
                    warn!(
                        "catalog rows {:?} and {:?} both match product {} v{}; \
                         keeping the first",
                        first.name, entry.name, product_id, software_version
                    );
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_12xl_resolves() {
        let entry = lookup(105, 230).unwrap();
        let set = entry.protocol_set();
        assert_eq!(set.command, Some(CommandProto::A010));
        assert_eq!(set.stack(Waypoints).unwrap().datatypes, [104]);
        assert!(set.stack(Runs).is_err());
    }

    #[test]
    fn version_ranges_select_different_rows() {
        let old = lookup(77, 250).unwrap();
        let mid = lookup(77, 320).unwrap();
        let new = lookup(77, 361).unwrap();
        assert_eq!(old.protocol_set().stack(Waypoints).unwrap().datatypes, [100]);
        assert_eq!(mid.protocol_set().stack(Waypoints).unwrap().datatypes, [103]);
        assert_eq!(new.protocol_set().stack(Waypoints).unwrap().datatypes, [104]);
    }

    #[test]
    fn unknown_products_miss() {
        assert!(lookup(9999, 100).is_none());
    }

    #[test]
    fn panel_mounts_use_a011() {
        assert_eq!(lookup(20, 100).unwrap().command, CommandProto::A011);
    }
}
