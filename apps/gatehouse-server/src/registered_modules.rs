// Linked so each module crate's manifest entry lands in the inventory.
// A build script could generate this from ./modules; maintained by hand for
// now.
#![allow(unused_imports)]

use audit_stats as _;
use qr_access as _;
use weather_connector as _;
