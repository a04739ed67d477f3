pub mod combined;
pub mod config;
pub mod hashing;
pub mod nonstandard;
pub mod preset;
pub mod traits;

pub mod phase0 {
    pub mod beacon_state;
    pub mod consts;
    pub mod containers;
    pub mod primitives;
}

pub mod capella {
    pub mod beacon_state;
    pub mod containers;
}
