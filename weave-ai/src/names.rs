use rand::Rng;
use rand::seq::SliceRandom;

const LEFT: &[&str] = &[
    "admiring", "adoring", "affectionate", "agitated", "amazing", "angry",
    "awesome", "beautiful", "blissful", "bold", "boring", "brave", "busy", "charming",
    "clever", "compassionate", "competent", "confident", "cool", "dazzling",
    "determined", "distracted", "dreamy", "eager", "ecstatic", "elastic",
    "elated", "elegant", "eloquent", "epic", "exciting", "fervent",
    "festive", "flamboyant", "focused", "friendly", "frosty", "funny",
    "gallant", "gifted", "goofy", "gracious", "great", "happy", "hardcore",
    "heuristic", "hopeful", "hungry", "infallible", "inspiring", "intelligent",
    "interesting", "jolly", "jovial", "keen", "kind", "laughing", "loving",
    "lucid", "magical", "modest", "musing", "mystifying", "naughty", "nervous",
    "nice", "nifty", "nostalgic", "objective", "optimistic", "peaceful",
    "pedantic", "pensive", "practical", "priceless", "quirky", "quizzical",
    "recursing", "relaxed", "reverent", "romantic", "sad", "serene", "sharp",
    "silly", "sleepy", "stoic", "strange", "stupefied", "suspicious", "sweet",
    "tender", "thirsty", "trusting", "unruffled", "upbeat", "vibrant",
    "vigilant", "vigorous", "wizardly", "wonderful", "xenodochial", "youthful",
    "zealous", "zen",
];

const RIGHT: &[&str] = &[
    "agnesi", "albattani", "allen", "almeida", "archimedes", "ardinghelli",
    "aryabhata", "babbage", "banach", "bardeen", "bartik", "bell", "bhabha",
    "blackwell", "bohr", "booth", "borg", "bose", "brahmagupta", "brown",
    "burnell", "cannon", "carson", "chandrasekhar", "clarke", "curie",
    "darwin", "davinci", "dijkstra", "dirac", "easley", "einstein", "elion",
    "engelbart", "euclid", "euler", "faraday", "fermat", "fermi", "feynman",
    "franklin", "galileo", "gauss", "goldberg", "goodall", "hamilton",
    "hawking", "heisenberg", "hermann", "hodgkin", "hopper", "hypatia",
    "jackson", "jang", "jennings", "johnson", "kalam", "kapitsa", "keller",
    "kepler", "khorana", "knuth", "kowalevski", "lalande", "lamarr",
    "leakey", "lovelace", "lumiere", "mahavira", "margulis", "mayer",
    "mccarthy", "mcclintock", "meitner", "mendel", "mirzakhani", "montalcini",
    "moore", "morse", "napier", "nash", "neumann", "newton", "nobel",
    "noether", "noyce", "pare", "pascal", "pasteur", "perlman", "pike",
    "poincare", "ptolemy", "raman", "ramanujan", "ride", "ritchie", "rosalind",
    "sammet", "shannon", "shockley", "sinoussi", "stonebraker", "swartz",
    "tesla", "thompson", "torvalds", "turing", "varahamihira", "villani",
    "visvesvaraya", "volhard", "wescoff", "wiles", "williams", "wilson",
    "wing", "wozniak", "wright", "yalow", "yonath",
];

/*
 * random_name returns a docker style `adjective_surname` name, with a
 * random digit appended when `retry` > 0.
 *
 * Names are not guaranteed to be unique: callers creating an object with a
 * generated name get AlreadyExists like for any other name.
 */
pub fn random_name(retry: u32) -> String {
    let mut rng = rand::thread_rng();

    loop {
	let left = LEFT.choose(&mut rng).copied().unwrap_or("happy");
	let right = RIGHT.choose(&mut rng).copied().unwrap_or("turing");
	let name = format!("{}_{}", left, right);

	/* Steve Wozniak is not boring */
	if name == "boring_wozniak" {
	    continue;
	}

	if retry > 0 {
	    return format!("{}{}", name, rng.gen_range(0..10));
	}
	return name;
    }
}

/*
 * Object names have to be DNS labels, the generated ones use '_'.
 */
pub fn random_object_name(retry: u32) -> String {
    random_name(retry).replace('_', "-")
}
