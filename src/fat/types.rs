//! Small newtype wrappers for the handful of integer spaces the FAT engine
//! juggles (CHS geometry, LBA, cluster numbers) so they can't be mixed up
//! at a call site.

use core::convert::TryInto;

macro_rules! newtype {
    ([$m:ident] $name:tt: $inner:ty $(where constructor = $c:ident)?) => {
        #[doc(hidden)]
        #[allow(non_snake_case)]
        pub mod $m {
            use core::ops::{Deref, DerefMut};

            // Doing this gives us bounded impls for these traits for free (i.e.
            // `Newtype<Inner>` will be `Copy` only if `Inner` is `Copy`.)
            //
            // We need one of these per newtype so that the type alias actually
            // points to a unique type; otherwise two `u16` newtypes would both
            // alias to `Newtype<u16>`.
            #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
            #[repr(transparent)]
            #[doc(hidden)]
            pub struct Newtype<Inner>(pub(in super) Inner);

            impl<Inner> Deref for Newtype<Inner> {
                type Target = Inner;

                #[inline]
                fn deref(&self) -> &Inner { &self.0 }
            }

            impl<Inner> DerefMut for Newtype<Inner> {
                #[inline]
                fn deref_mut(&mut self) -> &mut Inner { &mut self.0 }
            }
        }

        pub type $name = $m::Newtype<$inner>;

        impl $name {
            pub fn inner(&self) -> &$inner { &**self }
        }

        $(
            impl $name {
                pub const fn $c(inner: $inner) -> Self {
                    Self(inner)
                }
            }
        )?
    };
}

newtype! { [_cyl] Cylinder: u8 where constructor = new }
newtype! { [_head] Head: u8 where constructor = new }
/// 1-based, per IBM System/34 sector numbering.
newtype! { [_sec] SectorNumber: u8 where constructor = new }
newtype! { [_lba] Lba: u16 where constructor = new }
/// FAT12 cluster number; 0 and 1 are reserved, >= 2 are data clusters.
newtype! { [_clu] Cluster: u16 where constructor = new }

impl Lba {
    pub fn idx(&self) -> usize {
        (self.0).try_into().unwrap()
    }

    /// Splits an LBA into (cylinder, head, sector#) for `sectors_per_track`
    /// sectors/track and `heads` heads.
    pub fn to_chs(self, heads: u8, sectors_per_track: u8) -> (Cylinder, Head, SectorNumber) {
        let lba = self.0 as u32;
        let spt = sectors_per_track as u32;
        let heads = heads as u32;

        let track = lba / spt;
        let sector = (lba % spt) + 1;
        let cylinder = track / heads;
        let head = track % heads;

        (
            Cylinder::new(cylinder as u8),
            Head::new(head as u8),
            SectorNumber::new(sector as u8),
        )
    }

    pub fn from_chs(cylinder: Cylinder, head: Head, sector: SectorNumber, heads: u8, sectors_per_track: u8) -> Self {
        let cyl = *cylinder as u32;
        let h = *head as u32;
        let s = *sector as u32;
        let heads = heads as u32;
        let spt = sectors_per_track as u32;

        let lba = (cyl * heads + h) * spt + (s - 1);
        Lba::new(lba as u16)
    }
}

impl Cluster {
    pub fn idx(&self) -> usize {
        (self.0).try_into().unwrap()
    }

    pub const FREE: Cluster = Cluster::new(0x000);
    pub const RESERVED_MIN: Cluster = Cluster::new(0xFF0);
    pub const BAD: Cluster = Cluster::new(0xFF7);
    pub const EOC_MIN: Cluster = Cluster::new(0xFF8);

    pub fn is_eoc(self) -> bool {
        self.0 >= 0xFF8
    }

    pub fn is_free(self) -> bool {
        self.0 == 0
    }

    pub fn is_bad(self) -> bool {
        self.0 == 0xFF7
    }
}
