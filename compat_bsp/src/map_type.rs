use std::fmt;

/// Identifies one concrete BSP variant.
///
/// Tags form a bit lattice: the top byte selects the engine family and the
/// lower bits encode sub-families, so a concrete tag contains every bit of
/// each family it descends from. Membership is a single AND-equals test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct MapType(u32);

impl MapType {
    pub const UNDEFINED: MapType = MapType(0);

    pub const QUAKE: MapType = MapType(0x0100_0000);
    pub const GOLDSRC: MapType = MapType(0x0101_0000);
    pub const BLUE_SHIFT: MapType = MapType(0x0101_0001);
    pub const NIGHTFIRE: MapType = MapType(0x0102_0000);

    pub const QUAKE2: MapType = MapType(0x0200_0000);
    pub const DAIKATANA: MapType = MapType(0x0200_0001);
    pub const SIN: MapType = MapType(0x0200_0002);
    pub const SOF: MapType = MapType(0x0200_0004);

    pub const QUAKE3: MapType = MapType(0x0400_0000);
    pub const RAVEN: MapType = MapType(0x0400_0001);
    pub const FAKK2: MapType = MapType(0x0400_0100);
    pub const ALICE: MapType = MapType(0x0400_0300);
    pub const STEF2: MapType = MapType(0x0400_0500);
    pub const STEF2_DEMO: MapType = MapType(0x0400_0D00);
    pub const MOHAA: MapType = MapType(0x0400_2100);
    pub const MOHAA_BT: MapType = MapType(0x0400_6100);
    pub const COD: MapType = MapType(0x0401_0000);
    pub const COD2: MapType = MapType(0x0403_0000);

    pub const SOURCE: MapType = MapType(0x0800_0000);
    pub const SOURCE17: MapType = MapType(0x0800_0001);
    pub const SOURCE18: MapType = MapType(0x0800_0002);
    pub const SOURCE19: MapType = MapType(0x0800_0004);
    pub const SOURCE20: MapType = MapType(0x0800_0008);
    pub const SOURCE21: MapType = MapType(0x0800_0010);
    pub const SOURCE22: MapType = MapType(0x0800_0020);
    pub const SOURCE23: MapType = MapType(0x0800_0040);
    pub const SOURCE27: MapType = MapType(0x0800_0080);
    pub const VINDICTUS: MapType = MapType(0x0800_0108);
    pub const DMOMAM: MapType = MapType(0x0800_0208);
    pub const L4D2: MapType = MapType(0x0800_0410);
    pub const TACTICAL_INTERVENTION: MapType = MapType(0x0800_0820);
    pub const TITANFALL: MapType = MapType(0x0800_1000);

    /// Every tag a file can be detected as.
    pub const CONCRETE: [MapType; 31] = [
        MapType::QUAKE,
        MapType::GOLDSRC,
        MapType::BLUE_SHIFT,
        MapType::NIGHTFIRE,
        MapType::QUAKE2,
        MapType::DAIKATANA,
        MapType::SIN,
        MapType::SOF,
        MapType::QUAKE3,
        MapType::RAVEN,
        MapType::FAKK2,
        MapType::ALICE,
        MapType::STEF2,
        MapType::STEF2_DEMO,
        MapType::MOHAA,
        MapType::MOHAA_BT,
        MapType::COD,
        MapType::COD2,
        MapType::SOURCE17,
        MapType::SOURCE18,
        MapType::SOURCE19,
        MapType::SOURCE20,
        MapType::SOURCE21,
        MapType::SOURCE22,
        MapType::SOURCE23,
        MapType::SOURCE27,
        MapType::VINDICTUS,
        MapType::DMOMAM,
        MapType::L4D2,
        MapType::TACTICAL_INTERVENTION,
        MapType::TITANFALL,
    ];

    pub const fn from_bits(bits: u32) -> Self {
        MapType(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_undefined(self) -> bool {
        self.0 == 0
    }

    /// `(self & family) == family`. The undetermined tag is only a subtype
    /// of itself, and nothing is a subtype of it except itself.
    pub const fn is_subtype_of(self, family: MapType) -> bool {
        if self.0 == 0 || family.0 == 0 {
            return self.0 == family.0;
        }
        (self.0 & family.0) == family.0
    }

    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(tag, _)| *tag == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    /// Case-insensitive lookup by [`MapType::name`]; `-` and `_` are ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let needle = normalize_name(name);
        NAMES
            .iter()
            .find(|(_, candidate)| normalize_name(candidate) == needle)
            .map(|(tag, _)| *tag)
    }
}

impl fmt::Display for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

const NAMES: &[(MapType, &str)] = &[
    (MapType::UNDEFINED, "undefined"),
    (MapType::QUAKE, "quake"),
    (MapType::GOLDSRC, "goldsrc"),
    (MapType::BLUE_SHIFT, "blue_shift"),
    (MapType::NIGHTFIRE, "nightfire"),
    (MapType::QUAKE2, "quake2"),
    (MapType::DAIKATANA, "daikatana"),
    (MapType::SIN, "sin"),
    (MapType::SOF, "sof"),
    (MapType::QUAKE3, "quake3"),
    (MapType::RAVEN, "raven"),
    (MapType::FAKK2, "fakk2"),
    (MapType::ALICE, "alice"),
    (MapType::STEF2, "stef2"),
    (MapType::STEF2_DEMO, "stef2_demo"),
    (MapType::MOHAA, "mohaa"),
    (MapType::MOHAA_BT, "mohaa_bt"),
    (MapType::COD, "cod"),
    (MapType::COD2, "cod2"),
    (MapType::SOURCE, "source"),
    (MapType::SOURCE17, "source17"),
    (MapType::SOURCE18, "source18"),
    (MapType::SOURCE19, "source19"),
    (MapType::SOURCE20, "source20"),
    (MapType::SOURCE21, "source21"),
    (MapType::SOURCE22, "source22"),
    (MapType::SOURCE23, "source23"),
    (MapType::SOURCE27, "source27"),
    (MapType::VINDICTUS, "vindictus"),
    (MapType::DMOMAM, "dmomam"),
    (MapType::L4D2, "l4d2"),
    (MapType::TACTICAL_INTERVENTION, "tactical_intervention"),
    (MapType::TITANFALL, "titanfall"),
];

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
