//! Hint text for the Hint power-up.

const BREED_HINTS: &[(&str, &str)] = &[
    ("Labrador Retriever", "Bred to retrieve game from water; the classic family retriever."),
    ("German Shepherd", "A working herding breed famous in police and service roles."),
    ("Golden Retriever", "A gentle gundog known for its feathered golden coat."),
    ("Beagle", "A small scent hound with a loud bay and floppy ears."),
    ("Poodle", "Comes in three sizes and sports a curly, low-shedding coat."),
    ("Dachshund", "Long body, short legs, originally bred to hunt badgers."),
    ("Siberian Husky", "A sled dog with striking eyes and a thick double coat."),
    ("Dalmatian", "White coat covered in black or liver spots."),
    ("Border Collie", "A tireless sheepdog often called the smartest breed."),
    ("Corgi", "Short-legged Welsh herder favored by royalty."),
    ("Shiba Inu", "A fox-like Japanese spitz with a curled tail."),
    ("Basenji", "The barkless dog of Central Africa, it yodels instead."),
    ("Komondor", "Covered in long white cords that look like a mop."),
    ("Xoloitzcuintli", "An ancient hairless breed from Mexico."),
    ("Saluki", "A slender sighthound prized by desert nomads."),
];

/// Hint for `breed_name`: a breed-specific fact when known, otherwise a generic
/// template built from the name itself.
#[must_use]
pub fn hint_for(breed_name: &str) -> String {
    if let Some((_, hint)) = BREED_HINTS.iter().find(|(name, _)| *name == breed_name) {
        return (*hint).to_string();
    }
    let first = breed_name.chars().next().unwrap_or('?');
    let letters = breed_name.chars().filter(char::is_ascii_alphabetic).count();
    format!("This breed's name starts with '{first}' and has {letters} letters.")
}
