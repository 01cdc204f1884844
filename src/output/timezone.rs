//! # Timezone Dictionary
//!
//! Oracle `TIMESTAMP WITH TIME ZONE` values carry a 16-bit region id.
//! Rendering them needs the IANA name; the mapping is fixed by the database
//! release, so it lives in a compile-time perfect-hash table.

use phf::phf_map;

static TIME_ZONE_MAP: phf::Map<u16, &'static str> = phf_map! {
    0x80a8u16 => "Africa/Abidjan",
    0x80c8u16 => "Africa/Accra",
    0x8078u16 => "Africa/Algiers",
    0x80b0u16 => "Africa/Cairo",
    0x80f4u16 => "Africa/Casablanca",
    0x8120u16 => "Africa/Johannesburg",
    0x8124u16 => "Africa/Khartoum",
    0x8108u16 => "Africa/Lagos",
    0x80dcu16 => "Africa/Monrovia",
    0x80d4u16 => "Africa/Nairobi",
    0x80e0u16 => "Africa/Tripoli",
    0x8134u16 => "Africa/Tunis",
    0x8100u16 => "Africa/Windhoek",
    0x81b0u16 => "America/Adak",
    0x81a8u16 => "America/Anchorage",
    0x8abcu16 => "America/Argentina/Buenos_Aires",
    0x8320u16 => "America/Asuncion",
    0x830cu16 => "America/Bogota",
    0x82bcu16 => "America/Buenos_Aires",
    0x8334u16 => "America/Caracas",
    0x8194u16 => "America/Chicago",
    0x8260u16 => "America/Costa_Rica",
    0x8198u16 => "America/Denver",
    0x81d0u16 => "America/Detroit",
    0x8204u16 => "America/Edmonton",
    0x8270u16 => "America/El_Salvador",
    0x833cu16 => "America/Godthab",
    0x827cu16 => "America/Guatemala",
    0x8314u16 => "America/Guayaquil",
    0x81e0u16 => "America/Halifax",
    0x8264u16 => "America/Havana",
    0x99bcu16 => "America/Indiana/Indianapolis",
    0x8288u16 => "America/Jamaica",
    0x82d8u16 => "America/La_Paz",
    0x8324u16 => "America/Lima",
    0x819cu16 => "America/Los_Angeles",
    0x8294u16 => "America/Managua",
    0x8234u16 => "America/Mexico_City",
    0x8330u16 => "America/Montevideo",
    0x81e8u16 => "America/Montreal",
    0x8190u16 => "America/New_York",
    0x8298u16 => "America/Panama",
    0x81b4u16 => "America/Phoenix",
    0x8280u16 => "America/Port-au-Prince",
    0x829cu16 => "America/Puerto_Rico",
    0x81fcu16 => "America/Regina",
    0x8308u16 => "America/Santiago",
    0x826cu16 => "America/Santo_Domingo",
    0x82f0u16 => "America/Sao_Paulo",
    0x81d8u16 => "America/St_Johns",
    0x8284u16 => "America/Tegucigalpa",
    0x8244u16 => "America/Tijuana",
    0x8370u16 => "America/Toronto",
    0x8208u16 => "America/Vancouver",
    0x8228u16 => "America/Whitehorse",
    0x81f8u16 => "America/Winnipeg",
    0x83b0u16 => "Antarctica/McMurdo",
    0x8434u16 => "Asia/Almaty",
    0x8430u16 => "Asia/Amman",
    0x8424u16 => "Asia/Baghdad",
    0x83c8u16 => "Asia/Baku",
    0x84a0u16 => "Asia/Bangkok",
    0x8454u16 => "Asia/Beirut",
    0x8410u16 => "Asia/Calcutta",
    0x8494u16 => "Asia/Colombo",
    0x8498u16 => "Asia/Damascus",
    0x8bd0u16 => "Asia/Dhaka",
    0x84a8u16 => "Asia/Dubai",
    0x8474u16 => "Asia/Gaza",
    0x8cb4u16 => "Asia/Ho_Chi_Minh",
    0x83f8u16 => "Asia/Hong_Kong",
    0x84ccu16 => "Asia/Irkutsk",
    0x8414u16 => "Asia/Jakarta",
    0x8428u16 => "Asia/Jerusalem",
    0x83c0u16 => "Asia/Kabul",
    0x8470u16 => "Asia/Karachi",
    0x8c74u16 => "Asia/Kathmandu",
    0x8c10u16 => "Asia/Kolkata",
    0x84c8u16 => "Asia/Krasnoyarsk",
    0x8458u16 => "Asia/Kuala_Lumpur",
    0x844cu16 => "Asia/Kuwait",
    0x8c00u16 => "Asia/Macau",
    0x8478u16 => "Asia/Manila",
    0x846cu16 => "Asia/Muscat",
    0x8404u16 => "Asia/Nicosia",
    0x84c4u16 => "Asia/Novosibirsk",
    0x84c0u16 => "Asia/Omsk",
    0x8448u16 => "Asia/Pyongyang",
    0x847cu16 => "Asia/Qatar",
    0x83dcu16 => "Asia/Rangoon",
    0x8480u16 => "Asia/Riyadh",
    0x84b4u16 => "Asia/Saigon",
    0x84f4u16 => "Asia/Sakhalin",
    0x8444u16 => "Asia/Seoul",
    0x83e8u16 => "Asia/Shanghai",
    0x8490u16 => "Asia/Singapore",
    0x83fcu16 => "Asia/Taipei",
    0x84b0u16 => "Asia/Tashkent",
    0x8408u16 => "Asia/Tbilisi",
    0x8420u16 => "Asia/Tehran",
    0x842cu16 => "Asia/Tokyo",
    0x8464u16 => "Asia/Ulaanbaatar",
    0x83f0u16 => "Asia/Urumqi",
    0x84d4u16 => "Asia/Vladivostok",
    0x84d0u16 => "Asia/Yakutsk",
    0x84bcu16 => "Asia/Yekaterinburg",
    0x83c4u16 => "Asia/Yerevan",
    0x8540u16 => "Atlantic/Azores",
    0x8528u16 => "Atlantic/Bermuda",
    0x8548u16 => "Atlantic/Canary",
    0x854cu16 => "Atlantic/Cape_Verde",
    0x8538u16 => "Atlantic/Reykjavik",
    0x852cu16 => "Atlantic/Stanley",
    0x8574u16 => "Australia/Adelaide",
    0x856cu16 => "Australia/Brisbane",
    0x8564u16 => "Australia/Darwin",
    0x8578u16 => "Australia/Hobart",
    0x857cu16 => "Australia/Melbourne",
    0x8568u16 => "Australia/Perth",
    0x8580u16 => "Australia/Sydney",
    0x85b8u16 => "CET",
    0x835cu16 => "CST6CDT",
    0x85c0u16 => "EET",
    0x834cu16 => "EST",
    0x8358u16 => "EST5EDT",
    0x8004u16 => "Etc/GMT",
    0x8074u16 => "Etc/UCT",
    0x8070u16 => "Etc/UTC",
    0x8630u16 => "Europe/Amsterdam",
    0x8604u16 => "Europe/Athens",
    0x8670u16 => "Europe/Belgrade",
    0x85fcu16 => "Europe/Berlin",
    0x85e0u16 => "Europe/Brussels",
    0x8640u16 => "Europe/Bucharest",
    0x8608u16 => "Europe/Budapest",
    0x8624u16 => "Europe/Chisinau",
    0x85ecu16 => "Europe/Copenhagen",
    0x85ccu16 => "Europe/Dublin",
    0x8600u16 => "Europe/Gibraltar",
    0x85f4u16 => "Europe/Helsinki",
    0x865cu16 => "Europe/Istanbul",
    0x8644u16 => "Europe/Kaliningrad",
    0x8660u16 => "Europe/Kiev",
    0x863cu16 => "Europe/Lisbon",
    0x85c4u16 => "Europe/London",
    0x861cu16 => "Europe/Luxembourg",
    0x8650u16 => "Europe/Madrid",
    0x8620u16 => "Europe/Malta",
    0x85dcu16 => "Europe/Minsk",
    0x862cu16 => "Europe/Monaco",
    0x8648u16 => "Europe/Moscow",
    0x8634u16 => "Europe/Oslo",
    0x85f8u16 => "Europe/Paris",
    0x85e8u16 => "Europe/Prague",
    0x8610u16 => "Europe/Riga",
    0x860cu16 => "Europe/Rome",
    0x864cu16 => "Europe/Samara",
    0x866cu16 => "Europe/Simferopol",
    0x85e4u16 => "Europe/Sofia",
    0x8654u16 => "Europe/Stockholm",
    0x85f0u16 => "Europe/Tallinn",
    0x85d0u16 => "Europe/Tirane",
    0x85d8u16 => "Europe/Vienna",
    0x8618u16 => "Europe/Vilnius",
    0x8674u16 => "Europe/Volgograd",
    0x8638u16 => "Europe/Warsaw",
    0x8668u16 => "Europe/Zaporozhye",
    0x8658u16 => "Europe/Zurich",
    0x8804u16 => "GMT",
    0x8354u16 => "HST",
    0x86d4u16 => "Indian/Maldives",
    0x86ecu16 => "Indian/Mauritius",
    0x85bcu16 => "MET",
    0x8350u16 => "MST",
    0x8360u16 => "MST7MDT",
    0x875cu16 => "Pacific/Auckland",
    0x8760u16 => "Pacific/Chatham",
    0x8718u16 => "Pacific/Fiji",
    0x8728u16 => "Pacific/Guam",
    0x8708u16 => "Pacific/Honolulu",
    0x8770u16 => "Pacific/Port_Moresby",
    0x8724u16 => "Pacific/Tahiti",
    0x8364u16 => "PST8PDT",
    0x8874u16 => "UCT",
    0xd004u16 => "UTC",
    0x85b4u16 => "WET",
};

/// IANA name for an Oracle timezone region id.
pub fn timezone_name(id: u16) -> Option<&'static str> {
    TIME_ZONE_MAP.get(&id).copied()
}
